//! Up/down transition detection between two consecutive check results.

use serde::Serialize;

use crate::database::models::Endpoint;

use super::types::CheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    WentDown,
    Recovered,
}

/// Status change of one endpoint, ready for the notification sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    pub transition: Transition,
    pub endpoint: Endpoint,
    pub check: CheckResult,
}

/// Whether the endpoint counted as up before `current` was recorded.
///
/// Without any previous result the endpoint is assumed up, so the very first
/// failing check reports an outage and the very first success reports
/// nothing.
pub fn was_up(previous: Option<&CheckResult>) -> bool {
    previous.is_none_or(CheckResult::is_up)
}

/// Compare the previously latest result with the new one
pub fn detect(previous: Option<&CheckResult>, current: &CheckResult) -> Option<Transition> {
    match (was_up(previous), current.is_up()) {
        (true, false) => Some(Transition::WentDown),
        (false, true) => Some(Transition::Recovered),
        _ => None,
    }
}

/// `detect`, packaged with the endpoint and the check that caused it
pub fn detect_event(endpoint: &Endpoint, previous: Option<&CheckResult>, current: &CheckResult) -> Option<StatusEvent> {
    detect(previous, current).map(|transition| StatusEvent {
        transition,
        endpoint: endpoint.clone(),
        check: current.clone(),
    })
}
