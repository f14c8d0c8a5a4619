//! Entur Journey Planner v3 client.
//!
//! Builds the fixed estimated-calls GraphQL query for a stop place, posts it
//! with the `ET-Client-Name` header Entur requires, and converts the reply
//! into the shared `DepartureSnapshot` format.

use chrono::{DateTime, SecondsFormat, Utc};
use common::error::{format_error_chain, summarize_response_body};
use common::relay::read_upstream;
use common::{DepartureSnapshot, Error, EstimatedCall, LineInfo, UpstreamResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const GRAPHQL_PATH: &str = "/journey-planner/v3/graphql";

/// Header Entur uses to identify API consumers.
pub const CLIENT_NAME_HEADER: &str = "ET-Client-Name";

pub const DEFAULT_TIME_RANGE_SECS: u32 = 3 * 3600;
pub const DEFAULT_NUM_DEPARTURES: u32 = 30;

/// Estimated calls for one stop place, with line details.
pub const DEPARTURES_QUERY: &str = r#"query ($id: String!, $start: DateTime, $timeRange: Int!, $numberOfDepartures: Int!) {
  stopPlace(id: $id) {
    id
    name
    estimatedCalls(startTime: $start, timeRange: $timeRange, numberOfDepartures: $numberOfDepartures) {
      realtime
      aimedDepartureTime
      expectedDepartureTime
      destinationDisplay { frontText }
      serviceJourney {
        journeyPattern {
          line {
            id
            name
            publicCode
            transportMode
          }
        }
      }
    }
  }
}"#;

/// Parameters of one departures lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeparturesQuery {
    pub stop_place_id: String,
    pub time_range_secs: u32,
    pub num_departures: u32,
}

impl DeparturesQuery {
    pub fn new(stop_place_id: impl Into<String>) -> Self {
        Self {
            stop_place_id: stop_place_id.into(),
            time_range_secs: DEFAULT_TIME_RANGE_SECS,
            num_departures: DEFAULT_NUM_DEPARTURES,
        }
    }

    /// GraphQL request body starting the departure window at `start`.
    pub fn to_request_body(&self, start: DateTime<Utc>) -> serde_json::Value {
        json!({
            "query": DEPARTURES_QUERY,
            "variables": {
                "id": self.stop_place_id,
                "start": start.to_rfc3339_opts(SecondsFormat::Millis, true),
                "timeRange": self.time_range_secs,
                "numberOfDepartures": self.num_departures,
            }
        })
    }
}

/// Upstream Entur client.
///
/// The client name is per request because the proxy may take it from the
/// caller when none is configured.
#[derive(Debug, Clone)]
pub struct EnturClient {
    client: reqwest::Client,
    base_url: String,
}

// ── Entur response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<DeparturesData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeparturesData {
    #[serde(default)]
    pub stop_place: Option<StopPlace>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPlace {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub estimated_calls: Vec<RawEstimatedCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEstimatedCall {
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub aimed_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expected_departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destination_display: Option<DestinationDisplay>,
    #[serde(default)]
    pub service_journey: Option<ServiceJourney>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationDisplay {
    #[serde(default)]
    pub front_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceJourney {
    #[serde(default)]
    pub journey_pattern: Option<JourneyPattern>,
}

#[derive(Debug, Deserialize)]
pub struct JourneyPattern {
    #[serde(default)]
    pub line: Option<RawLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLine {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public_code: Option<String>,
    #[serde(default)]
    pub transport_mode: Option<String>,
}

impl From<RawEstimatedCall> for EstimatedCall {
    fn from(raw: RawEstimatedCall) -> Self {
        let line = raw
            .service_journey
            .and_then(|sj| sj.journey_pattern)
            .and_then(|jp| jp.line)
            .map(|l| LineInfo {
                id: l.id,
                name: l.name,
                public_code: l.public_code,
                transport_mode: l.transport_mode,
            });

        EstimatedCall {
            realtime: raw.realtime,
            aimed_departure_time: raw.aimed_departure_time,
            expected_departure_time: raw.expected_departure_time,
            destination: raw.destination_display.and_then(|d| d.front_text),
            line,
        }
    }
}

/// Parse a relayed GraphQL body into a snapshot.
///
/// GraphQL reports failures in-band; a reply with `errors` and no stop place
/// is a failed fetch.
pub fn parse_departures(body: serde_json::Value) -> Result<DepartureSnapshot, Error> {
    let parsed: GraphQlResponse = serde_json::from_value(body)?;

    let stop_place = parsed.data.and_then(|d| d.stop_place);
    let Some(stop) = stop_place else {
        if parsed.errors.is_empty() {
            return Err(Error::Other("Entur returned no stop place".into()));
        }
        let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(Error::Other(format!(
            "Entur GraphQL errors: {}",
            summarize_response_body(&messages.join("; "))
        )));
    };

    Ok(DepartureSnapshot {
        stop_id: stop.id,
        stop_name: stop.name,
        calls: stop.estimated_calls.into_iter().map(EstimatedCall::from).collect(),
    })
}

// ── Implementation ────────────────────────────────────────────────────

impl EnturClient {
    /// Build a client for `base_url` (e.g. `https://api.entur.io`).
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| Error::Config(format!("failed to build Entur HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn graphql_url(&self) -> String {
        format!("{}{}", self.base_url, GRAPHQL_PATH)
    }

    /// Post the departures query, returning the raw reply for relay.
    pub async fn fetch_departures(
        &self,
        query: &DeparturesQuery,
        client_name: &str,
    ) -> Result<UpstreamResponse, Error> {
        let url = self.graphql_url();
        let body = query.to_request_body(Utc::now());
        debug!(
            "Fetching Entur departures: {} stop={} range={}s num={}",
            url, query.stop_place_id, query.time_range_secs, query.num_departures
        );

        let resp = self
            .client
            .post(&url)
            .header(CLIENT_NAME_HEADER, client_name)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::Http(format!(
                    "Entur request failed for {}: {}",
                    query.stop_place_id,
                    format_error_chain(&e)
                ))
            })?;

        read_upstream(resp, "Entur").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_response() -> serde_json::Value {
        json!({
            "data": {
                "stopPlace": {
                    "id": "NSR:StopPlace:58856",
                    "name": "Lysaker stasjon",
                    "estimatedCalls": [
                        {
                            "realtime": true,
                            "aimedDepartureTime": "2026-03-01T08:04:00+01:00",
                            "expectedDepartureTime": "2026-03-01T08:06:00+01:00",
                            "destinationDisplay": {"frontText": "Lillestrøm"},
                            "serviceJourney": {"journeyPattern": {"line": {
                                "id": "VYG:Line:L1",
                                "name": "Spikkestad-Lillestrøm",
                                "publicCode": "L1",
                                "transportMode": "rail"
                            }}}
                        },
                        {
                            "realtime": false,
                            "aimedDepartureTime": "2026-03-01T08:05:00+01:00",
                            "expectedDepartureTime": "2026-03-01T08:05:00+01:00",
                            "destinationDisplay": {"frontText": "Fornebu"},
                            "serviceJourney": {"journeyPattern": {"line": {
                                "id": "RUT:Line:31",
                                "publicCode": "31",
                                "transportMode": "bus"
                            }}}
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_request_body_carries_variables() {
        let query = DeparturesQuery {
            stop_place_id: "NSR:StopPlace:58856".into(),
            time_range_secs: 7200,
            num_departures: 12,
        };
        let start = DateTime::parse_from_rfc3339("2026-03-01T07:00:00Z")
            .expect("valid ts")
            .with_timezone(&Utc);

        let body = query.to_request_body(start);
        assert_eq!(
            body["variables"],
            json!({
                "id": "NSR:StopPlace:58856",
                "start": "2026-03-01T07:00:00.000Z",
                "timeRange": 7200,
                "numberOfDepartures": 12
            })
        );
        assert_eq!(body["query"], DEPARTURES_QUERY);
    }

    #[test]
    fn test_parse_departures_maps_calls() {
        let snapshot = parse_departures(sample_response()).expect("departures should parse");

        assert_eq!(snapshot.stop_id, "NSR:StopPlace:58856");
        assert_eq!(snapshot.stop_name.as_deref(), Some("Lysaker stasjon"));
        assert_eq!(snapshot.calls.len(), 2);

        let first = &snapshot.calls[0];
        assert_eq!(first.destination.as_deref(), Some("Lillestrøm"));
        let line = first.line.as_ref().expect("line present");
        assert_eq!(line.public_code.as_deref(), Some("L1"));
        assert_eq!(line.transport_mode.as_deref(), Some("rail"));
        assert_eq!(
            first.expected_departure_time,
            Some(
                DateTime::parse_from_rfc3339("2026-03-01T07:06:00Z")
                    .expect("valid ts")
                    .with_timezone(&Utc)
            )
        );
    }

    #[test]
    fn test_parse_departures_surfaces_graphql_errors() {
        let err = parse_departures(json!({
            "data": null,
            "errors": [{"message": "Unknown stop place"}]
        }))
        .unwrap_err();

        assert!(err.to_string().contains("Unknown stop place"));
    }

    #[test]
    fn test_parse_departures_missing_stop() {
        let err = parse_departures(json!({"data": {"stopPlace": null}})).unwrap_err();
        assert!(err.to_string().contains("no stop place"));
    }

    #[tokio::test]
    async fn test_fetch_departures_posts_query_with_client_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(header(CLIENT_NAME_HEADER, "acme-lysaker"))
            .and(body_partial_json(json!({
                "variables": {"id": "NSR:StopPlace:58856", "numberOfDepartures": 30}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_response()))
            .expect(1)
            .mount(&server)
            .await;

        let client = EnturClient::new(&server.uri()).expect("client should build");
        let resp = client
            .fetch_departures(&DeparturesQuery::new("NSR:StopPlace:58856"), "acme-lysaker")
            .await
            .expect("fetch should succeed");

        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, sample_response());
    }
}
