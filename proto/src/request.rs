use serde::{Deserialize, Serialize};

use crate::EpochMillis;

/// Bodies POSTed to the subscription url
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionRequest {
    /// Ask the server to replay every operation since `updated_from`
    #[serde(rename_all = "camelCase")]
    Recovery { updated_from: EpochMillis },
    /// Tell the server which business period the viewer is looking at
    #[serde(rename_all = "camelCase")]
    BusinessPeriod { range_start: EpochMillis, range_end: EpochMillis },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bodies_match_server_contract() {
        let recovery = serde_json::to_value(SubscriptionRequest::Recovery { updated_from: 42 }).unwrap();
        assert_eq!(recovery, serde_json::json!({ "updatedFrom": 42 }));
        let period = serde_json::to_value(SubscriptionRequest::BusinessPeriod { range_start: 1, range_end: 2 }).unwrap();
        assert_eq!(period, serde_json::json!({ "rangeStart": 1, "rangeEnd": 2 }));
    }
}
