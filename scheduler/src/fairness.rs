//! Per-user admission fairness across that user's experiments (spec §4.7
//! Phase A, tie-break rule), generalized from
//! `backend/src/scheduler/drr.rs`'s deficit round robin: instead of metering
//! trade-bid credit per session, each experiment accrues one unit of credit
//! per pass and is only admitted from while it can afford the flat cost of
//! admitting one batch. This keeps a user's busy experiment from starving
//! their other experiments within the same pass, while the literal
//! "fewest-in-flight, tie-break registrationTime" rule from the spec decides
//! *which* eligible experiment goes first.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::model::Experiment;
use uuid::Uuid;

const QUANTUM: i64 = 1;
const CAP: i64 = 2;

/// Carries each experiment's DRR deficit across passes. Lives in the
/// Scheduler for the process lifetime; restart resets it to empty, which
/// just means every experiment starts fully credited — harmless since the
/// fewest-in-flight tie-break still governs ordering.
#[derive(Default)]
pub struct FairnessTracker {
    deficits: HashMap<Uuid, i64>,
}

impl FairnessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn accumulate_credit(&mut self, experiment_id: Uuid) {
        let deficit = self.deficits.entry(experiment_id).or_insert(0);
        *deficit = (*deficit + QUANTUM).min(CAP);
    }

    fn can_serve(&self, experiment_id: Uuid) -> bool {
        self.deficits.get(&experiment_id).copied().unwrap_or(0) >= QUANTUM
    }

    fn charge(&mut self, experiment_id: Uuid) {
        let deficit = self.deficits.entry(experiment_id).or_insert(0);
        *deficit = (*deficit - QUANTUM).max(0);
    }

    /// Picks the next experiment to admit from among `candidates` (ids with
    /// at least one pending batch), given each one's current in-flight count
    /// and registration time. Charges the winner's deficit; callers that
    /// decide not to actually admit (resource fit failed) should not call
    /// this again for the same candidate this pass — the credit already
    /// spent rolls over to next pass as a mild fairness cost, matching the
    /// teacher's "charge exactly once" discipline.
    pub fn pick_next<'a>(
        &mut self,
        candidates: impl IntoIterator<Item = &'a Experiment>,
        inflight: &HashMap<Uuid, i64>,
    ) -> Option<Uuid> {
        let mut best: Option<(Uuid, i64, DateTime<Utc>)> = None;

        for exp in candidates {
            self.accumulate_credit(exp.id);
            if !self.can_serve(exp.id) {
                continue;
            }
            let count = inflight.get(&exp.id).copied().unwrap_or(0);
            let better = match &best {
                None => true,
                Some((_, best_count, best_time)) => {
                    count < *best_count || (count == *best_count && exp.registration_time < *best_time)
                }
            };
            if better {
                best = Some((exp.id, count, exp.registration_time));
            }
        }

        best.map(|(id, _, _)| {
            self.charge(id);
            id
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::model::{ContainerSettings, ExecutionSettings};

    fn mk_experiment(id: u128, registered_secs_ago: i64) -> Experiment {
        Experiment {
            id: Uuid::from_u128(id),
            username: "alice".to_string(),
            container: ContainerSettings {
                engine: "docker".to_string(),
                image: "alpine".to_string(),
                ram_mb: 128,
                gpus: None,
            },
            execution: ExecutionSettings {
                engine: "ccagency".to_string(),
                retry_if_failed: false,
                batch_concurrency_limit: 5,
                access_url: None,
            },
            notifications: vec![],
            registration_time: Utc::now() - Duration::seconds(registered_secs_ago),
        }
    }

    #[test]
    fn fewest_in_flight_wins() {
        let busy = mk_experiment(1, 10);
        let idle = mk_experiment(2, 5);
        let mut inflight = HashMap::new();
        inflight.insert(busy.id, 3);
        inflight.insert(idle.id, 0);

        let mut tracker = FairnessTracker::new();
        let picked = tracker.pick_next([&busy, &idle], &inflight);
        assert_eq!(picked, Some(idle.id));
    }

    #[test]
    fn ties_break_by_registration_time() {
        let older = mk_experiment(1, 20);
        let newer = mk_experiment(2, 5);
        let inflight = HashMap::new();

        let mut tracker = FairnessTracker::new();
        let picked = tracker.pick_next([&newer, &older], &inflight);
        assert_eq!(picked, Some(older.id));
    }

    #[test]
    fn exhausted_credit_is_skipped_until_it_recovers() {
        let exp = mk_experiment(1, 1);
        let inflight = HashMap::new();
        let mut tracker = FairnessTracker::new();

        // Starts with deficit 0; accumulate_credit brings it to 1 (servable),
        // charge drops it back to 0.
        assert_eq!(tracker.pick_next([&exp], &inflight), Some(exp.id));
        // Next pass: deficit 0 -> accumulate to 1 -> servable again.
        assert_eq!(tracker.pick_next([&exp], &inflight), Some(exp.id));
    }
}
