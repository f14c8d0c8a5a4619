//! Panel-fit: how many list rows fit a panel without overflow.

use std::time::Duration;

use tracing::debug;

/// Row height used before any row has been measured.
pub const DEFAULT_ROW_HEIGHT: f64 = 84.0;
/// Measured rows below this height are treated as not yet laid out.
pub const MIN_ROW_HEIGHT: f64 = 40.0;
pub const DEFAULT_GAP: f64 = 12.0;
/// Row count shown before the first measurement.
pub const INITIAL_ROWS: usize = 4;
/// Extra measurement after first mount to absorb late font and layout shifts.
pub const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Measured list element: one representative row and the inter-row gap.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ListMetrics {
    pub row_height: Option<f64>,
    pub gap: Option<f64>,
}

/// Pixel geometry of one panel at measurement time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitGeometry {
    pub container_height: f64,
    pub header_height: f64,
    pub padding_top: f64,
    pub padding_bottom: f64,
    /// `None` when the list element is not rendered.
    pub list: Option<ListMetrics>,
}

impl FitGeometry {
    pub fn available_height(&self) -> f64 {
        (self.container_height - self.header_height - self.padding_top - self.padding_bottom)
            .max(0.0)
    }
}

/// `floor((available + gap) / (row + gap))`, at least 1.
///
/// Rows without a usable measurement count as [`DEFAULT_ROW_HEIGHT`].
pub fn rows_that_fit(available: f64, row_height: Option<f64>, gap: Option<f64>) -> usize {
    let row = match row_height {
        Some(h) if h.is_finite() && h >= MIN_ROW_HEIGHT => h,
        _ => DEFAULT_ROW_HEIGHT,
    };
    let gap = gap.filter(|g| g.is_finite() && *g >= 0.0).unwrap_or(DEFAULT_GAP);
    let available = if available.is_finite() { available.max(0.0) } else { 0.0 };

    let rows = ((available + gap) / (row + gap)).floor();
    if rows.is_finite() && rows >= 1.0 {
        rows as usize
    } else {
        1
    }
}

pub fn fit_rows(geometry: &FitGeometry) -> usize {
    match geometry.list {
        Some(list) => rows_that_fit(geometry.available_height(), list.row_height, list.gap),
        None => 1,
    }
}

/// Why a measurement was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitTrigger {
    InitialLayout,
    ContainerResize,
    ContentMutation,
    WindowResize,
    OrientationChange,
    FullscreenToggle,
    SettleDelay,
}

/// What the caller should do after [`FitScheduler::request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitAction {
    /// Measure immediately with [`FitScheduler::measure_now`].
    MeasureNow,
    /// Schedule one frame callback and call [`FitScheduler::on_frame`] from it.
    RequestFrame,
    /// A frame is already pending; nothing to do.
    Coalesced,
}

/// Coalesces measurement requests so at most one runs per frame.
#[derive(Debug, Clone)]
pub struct FitScheduler {
    rows: usize,
    frame_pending: bool,
}

impl Default for FitScheduler {
    fn default() -> Self {
        Self {
            rows: INITIAL_ROWS,
            frame_pending: false,
        }
    }
}

impl FitScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    pub fn request(&mut self, trigger: FitTrigger) -> FitAction {
        if trigger == FitTrigger::InitialLayout {
            return FitAction::MeasureNow;
        }
        if self.frame_pending {
            debug!("fit request coalesced: {:?}", trigger);
            return FitAction::Coalesced;
        }
        self.frame_pending = true;
        FitAction::RequestFrame
    }

    /// Run the pending measurement. Returns the new row count if it changed.
    pub fn on_frame(&mut self, geometry: &FitGeometry) -> Option<usize> {
        if !self.frame_pending {
            return None;
        }
        self.frame_pending = false;
        self.apply(fit_rows(geometry))
    }

    /// Measure synchronously. Returns the new row count if it changed.
    pub fn measure_now(&mut self, geometry: &FitGeometry) -> Option<usize> {
        self.apply(fit_rows(geometry))
    }

    /// Drop a pending frame (teardown).
    pub fn cancel(&mut self) {
        self.frame_pending = false;
    }

    fn apply(&mut self, rows: usize) -> Option<usize> {
        if rows == self.rows {
            return None;
        }
        debug!("fit rows {} -> {}", self.rows, rows);
        self.rows = rows;
        Some(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn geometry(container: f64, row: Option<f64>) -> FitGeometry {
        FitGeometry {
            container_height: container,
            header_height: 64.0,
            padding_top: 16.0,
            padding_bottom: 16.0,
            list: Some(ListMetrics {
                row_height: row,
                gap: Some(12.0),
            }),
        }
    }

    #[test]
    fn test_rows_that_fit() {
        assert_eq!(rows_that_fit(400.0, Some(84.0), Some(12.0)), 4);
        assert_eq!(rows_that_fit(0.0, Some(84.0), Some(12.0)), 1);
        assert_eq!(rows_that_fit(-50.0, Some(84.0), Some(12.0)), 1);
        assert_eq!(rows_that_fit(f64::NAN, Some(84.0), Some(12.0)), 1);
        // 1000 px: floor(1012 / 96) = 10.
        assert_eq!(rows_that_fit(1000.0, Some(84.0), None), 10);
    }

    #[test]
    fn test_unusable_row_height_falls_back_to_default() {
        assert_eq!(rows_that_fit(400.0, Some(20.0), Some(12.0)), 4);
        assert_eq!(rows_that_fit(400.0, None, Some(12.0)), 4);
        assert_eq!(rows_that_fit(400.0, Some(f64::INFINITY), Some(12.0)), 4);
        assert_eq!(rows_that_fit(400.0, Some(40.0), Some(12.0)), 7);
    }

    #[test]
    fn test_fit_rows_subtracts_header_and_padding() {
        // 496 - 64 - 32 = 400 available.
        let geom = geometry(496.0, Some(84.0));
        assert_eq!(geom.available_height(), 400.0);
        assert_eq!(fit_rows(&geom), 4);

        let tiny = geometry(50.0, Some(84.0));
        assert_eq!(tiny.available_height(), 0.0);
        assert_eq!(fit_rows(&tiny), 1);

        let no_list = FitGeometry {
            list: None,
            ..geometry(2000.0, Some(84.0))
        };
        assert_eq!(fit_rows(&no_list), 1);
    }

    #[test]
    fn test_scheduler_coalesces_within_frame() {
        let mut fit = FitScheduler::new();
        assert_eq!(fit.rows(), INITIAL_ROWS);

        assert_eq!(fit.request(FitTrigger::ContainerResize), FitAction::RequestFrame);
        assert_eq!(fit.request(FitTrigger::ContentMutation), FitAction::Coalesced);
        assert_eq!(fit.request(FitTrigger::WindowResize), FitAction::Coalesced);

        assert_eq!(fit.on_frame(&geometry(1096.0, Some(84.0))), Some(10));
        // The frame already ran; a stray callback does nothing.
        assert_eq!(fit.on_frame(&geometry(200.0, Some(84.0))), None);
        assert_eq!(fit.rows(), 10);

        assert_eq!(fit.request(FitTrigger::FullscreenToggle), FitAction::RequestFrame);
    }

    #[test]
    fn test_initial_layout_measures_synchronously() {
        let mut fit = FitScheduler::new();
        assert_eq!(fit.request(FitTrigger::InitialLayout), FitAction::MeasureNow);
        assert!(!fit.frame_pending());
        assert_eq!(fit.measure_now(&geometry(496.0, Some(84.0))), None);
        assert_eq!(fit.measure_now(&geometry(208.0, Some(84.0))), Some(1));
    }

    #[test]
    fn test_cancel_drops_pending_frame() {
        let mut fit = FitScheduler::new();
        fit.request(FitTrigger::SettleDelay);
        fit.cancel();
        assert_eq!(fit.on_frame(&geometry(1096.0, Some(84.0))), None);
        assert_eq!(fit.rows(), INITIAL_ROWS);
    }
}
