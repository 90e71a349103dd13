use common::model::BatchState;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct NotificationRequest {
    pub urls: Vec<String>,
    pub batches: Vec<(Uuid, BatchState)>,
}

#[derive(Serialize)]
struct NotifyBatch {
    #[serde(rename = "batchId")]
    batch_id: Uuid,
    state: &'static str,
}

#[derive(Serialize)]
pub(crate) struct NotificationBody {
    batches: Vec<NotifyBatch>,
}

impl From<&NotificationRequest> for NotificationBody {
    fn from(req: &NotificationRequest) -> Self {
        let mut batches: Vec<NotifyBatch> = req
            .batches
            .iter()
            .map(|(id, state)| NotifyBatch {
                batch_id: *id,
                state: state.as_str(),
            })
            .collect();
        // "within a single attempt the batch list is sorted by batch id"
        batches.sort_by_key(|b| b.batch_id);
        NotificationBody { batches }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_sorts_batches_by_id() {
        let a = Uuid::from_u128(2);
        let b = Uuid::from_u128(1);
        let req = NotificationRequest {
            urls: vec!["https://example.com/hook".to_string()],
            batches: vec![(a, BatchState::Succeeded), (b, BatchState::Failed)],
        };
        let body = NotificationBody::from(&req);
        assert_eq!(body.batches[0].batch_id, b);
        assert_eq!(body.batches[1].batch_id, a);
    }

    #[test]
    fn serializes_with_expected_shape() {
        let id = Uuid::from_u128(1);
        let req = NotificationRequest {
            urls: vec![],
            batches: vec![(id, BatchState::Cancelled)],
        };
        let body = NotificationBody::from(&req);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["batches"][0]["state"], "cancelled");
        assert_eq!(json["batches"][0]["batchId"], id.to_string());
    }
}
