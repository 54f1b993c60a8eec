use crate::domain::models::{Act, ActDraft, ActId};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

pub const RESEQUENCE_GAP_MINUTES: i64 = 5;

/// Owns the schedule. Acts are kept sorted by start time after every mutation,
/// and every mutation bumps `revision` so observers can tell the list changed.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    acts: Vec<Act>,
    revision: u64,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_acts(acts: Vec<Act>) -> Self {
        let mut store = Self::default();
        store.replace_all(acts);
        store
    }

    pub fn acts(&self) -> &[Act] {
        &self.acts
    }

    pub fn get(&self, id: ActId) -> Option<&Act> {
        self.acts.iter().find(|act| act.id() == id)
    }

    pub fn len(&self) -> usize {
        self.acts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acts.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Form submission path: the draft is validated before anything is stored.
    pub fn add(&mut self, draft: ActDraft) -> Result<ActId, InfraError> {
        let act = draft.into_act().map_err(InfraError::InvalidAct)?;
        let id = act.id();
        self.insert(act);
        Ok(id)
    }

    pub fn insert(&mut self, act: Act) {
        self.acts.push(act);
        self.sort();
        self.touch();
    }

    pub fn remove(&mut self, id: ActId) -> bool {
        let before = self.acts.len();
        self.acts.retain(|act| act.id() != id);
        if self.acts.len() == before {
            debug!("remove ignored, act_id={id} not in schedule");
            return false;
        }
        self.touch();
        true
    }

    pub fn replace_all(&mut self, acts: Vec<Act>) {
        self.acts = acts;
        self.sort();
        self.touch();
    }

    /// Moves the act at `from_index` so that it ends up at `to_index`, then
    /// rewrites every start time back to back with a fixed gap, anchored at the
    /// start of the timeline as it was before the move.
    pub fn reorder(&mut self, from_index: usize, to_index: usize) -> bool {
        if from_index >= self.acts.len() {
            warn!(
                "reorder ignored, from_index={from_index} len={}",
                self.acts.len()
            );
            return false;
        }

        // Anchor on the start of whatever was first before the move, not on the
        // act that ends up first.
        let anchor = self.acts[0].start_time();
        let moved = self.acts.remove(from_index);
        let target = to_index.min(self.acts.len());
        self.acts.insert(target, moved);

        let gap = Duration::minutes(RESEQUENCE_GAP_MINUTES);
        let mut cursor = anchor;
        self.acts = self
            .acts
            .iter()
            .map(|act| {
                let placed = act.rescheduled(cursor);
                cursor = placed.end_time() + gap;
                placed
            })
            .collect();

        self.sort();
        self.touch();
        true
    }

    /// Replaces whatever occupies `now` with a fresh copy of act `id` starting
    /// at `now`. Returns the id of the promoted act.
    pub fn start_now(&mut self, id: ActId, now: DateTime<Utc>) -> Option<ActId> {
        let Some(source) = self.get(id) else {
            warn!("start_now ignored, act_id={id} not in schedule");
            return None;
        };

        let promoted = source.promoted(now);
        let promoted_id = promoted.id();
        let before = self.acts.len();
        self.acts.retain(|act| !act.covers(now));
        debug!(
            "start_now superseded {} act(s) covering {now}",
            before - self.acts.len()
        );

        self.acts.push(promoted);
        self.sort();
        self.touch();
        Some(promoted_id)
    }

    fn sort(&mut self) {
        self.acts.sort_by_key(Act::start_time);
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn act(name: &str, start: &str, minutes: i64) -> Act {
        Act::new(name, Duration::minutes(minutes), fixed_time(start)).expect("valid act")
    }

    fn names(store: &ScheduleStore) -> Vec<&str> {
        store.acts().iter().map(Act::name).collect()
    }

    fn assert_sorted(store: &ScheduleStore) {
        assert!(
            store
                .acts()
                .windows(2)
                .all(|pair| pair[0].start_time() <= pair[1].start_time())
        );
    }

    #[test]
    fn insert_keeps_schedule_sorted() {
        let mut store = ScheduleStore::new();
        store.insert(act("C", "2026-02-16T11:00:00Z", 30));
        store.insert(act("A", "2026-02-16T09:00:00Z", 30));
        store.insert(act("B", "2026-02-16T10:00:00Z", 30));

        assert_eq!(names(&store), vec!["A", "B", "C"]);
        assert_eq!(store.revision(), 3);
    }

    #[test]
    fn add_rejects_invalid_drafts_without_touching_schedule() {
        let mut store = ScheduleStore::new();
        let start = fixed_time("2026-02-16T09:00:00Z");

        let empty_name = store.add(ActDraft::new("  ", start, Duration::minutes(10)));
        assert!(matches!(empty_name, Err(InfraError::InvalidAct(_))));
        let zero = store.add(ActDraft::new("Talk", start, Duration::zero()));
        assert!(matches!(zero, Err(InfraError::InvalidAct(_))));

        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);

        let id = store
            .add(ActDraft::new("Talk", start, Duration::minutes(10)))
            .expect("valid draft");
        assert_eq!(store.get(id).map(Act::name), Some("Talk"));
    }

    #[test]
    fn remove_missing_id_is_a_no_op() {
        let mut store = ScheduleStore::from_acts(vec![act("A", "2026-02-16T09:00:00Z", 30)]);
        let revision = store.revision();

        assert!(!store.remove(ActId::new()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);

        let id = store.acts()[0].id();
        assert!(store.remove(id));
        assert!(store.is_empty());
    }

    #[test]
    fn replace_all_sorts_incoming_acts() {
        let mut store = ScheduleStore::from_acts(vec![act("old", "2026-02-16T08:00:00Z", 10)]);
        store.replace_all(vec![
            act("late", "2026-02-16T15:00:00Z", 10),
            act("early", "2026-02-16T07:00:00Z", 10),
        ]);
        assert_eq!(names(&store), vec!["early", "late"]);

        store.replace_all(Vec::new());
        assert!(store.is_empty());
    }

    #[test]
    fn reorder_moves_last_to_front_and_resequences_with_gap() {
        let mut store = ScheduleStore::from_acts(vec![
            act("A", "2026-02-16T09:00:00Z", 30),
            act("B", "2026-02-16T10:00:00Z", 30),
            act("C", "2026-02-16T11:00:00Z", 30),
        ]);
        let ids: Vec<ActId> = store.acts().iter().map(Act::id).collect();

        assert!(store.reorder(2, 0));

        let acts = store.acts();
        assert_eq!(names(&store), vec!["C", "A", "B"]);
        assert_eq!(acts[0].start_time(), fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(acts[1].start_time(), fixed_time("2026-02-16T09:35:00Z"));
        assert_eq!(acts[2].start_time(), fixed_time("2026-02-16T10:10:00Z"));
        assert!(acts.iter().all(|act| act.duration() == Duration::minutes(30)));
        assert_eq!(acts[0].id(), ids[2]);
        assert_eq!(acts[1].id(), ids[0]);
    }

    #[test]
    fn reorder_clamps_target_to_last_position() {
        let mut store = ScheduleStore::from_acts(vec![
            act("A", "2026-02-16T09:00:00Z", 30),
            act("B", "2026-02-16T10:00:00Z", 60),
        ]);
        assert!(store.reorder(0, 10));
        assert_eq!(names(&store), vec!["B", "A"]);
        assert_eq!(store.acts()[0].start_time(), fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(store.acts()[1].start_time(), fixed_time("2026-02-16T10:05:00Z"));
    }

    #[test]
    fn reorder_on_empty_schedule_is_a_no_op() {
        let mut store = ScheduleStore::new();
        assert!(!store.reorder(0, 0));
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn start_now_supersedes_every_act_covering_now() {
        let now = fixed_time("2026-02-16T09:15:00Z");
        let mut store = ScheduleStore::from_acts(vec![
            act("running", "2026-02-16T09:00:00Z", 30),
            act("overlap", "2026-02-16T09:10:00Z", 60),
            act("later", "2026-02-16T12:00:00Z", 30),
            act("finale", "2026-02-16T13:00:00Z", 15),
        ]);
        let finale = store.acts()[3].id();

        let promoted = store.start_now(finale, now).expect("known act");

        let covering: Vec<&Act> = store.acts().iter().filter(|act| act.covers(now)).collect();
        assert_eq!(covering.len(), 1);
        assert_eq!(covering[0].id(), promoted);
        assert_eq!(covering[0].name(), "finale");
        assert_eq!(covering[0].duration(), Duration::minutes(15));
        assert_eq!(names(&store), vec!["finale", "later", "finale"]);
        assert_sorted(&store);
    }

    #[test]
    fn start_now_on_current_act_replaces_it() {
        let now = fixed_time("2026-02-16T09:15:00Z");
        let mut store = ScheduleStore::from_acts(vec![act("running", "2026-02-16T09:00:00Z", 30)]);
        let original = store.acts()[0].id();

        let promoted = store.start_now(original, now).expect("known act");

        assert_eq!(store.len(), 1);
        assert!(store.get(original).is_none());
        assert_eq!(store.get(promoted).map(Act::start_time), Some(now));
    }

    #[test]
    fn start_now_unknown_id_leaves_schedule_untouched() {
        let mut store = ScheduleStore::from_acts(vec![act("A", "2026-02-16T09:00:00Z", 30)]);
        let revision = store.revision();
        assert!(store.start_now(ActId::new(), fixed_time("2026-02-16T09:10:00Z")).is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);
    }

    #[derive(Debug, Clone)]
    enum Mutation {
        Insert { offset_minutes: i64, minutes: i64 },
        RemoveAt(usize),
        Reorder(usize, usize),
        StartNow { index: usize, now_offset: i64 },
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        prop_oneof![
            (0i64..600, 0i64..120).prop_map(|(offset_minutes, minutes)| Mutation::Insert {
                offset_minutes,
                minutes
            }),
            (0usize..8).prop_map(Mutation::RemoveAt),
            (0usize..8, 0usize..8).prop_map(|(from, to)| Mutation::Reorder(from, to)),
            (0usize..8, 0i64..600).prop_map(|(index, now_offset)| Mutation::StartNow {
                index,
                now_offset
            }),
        ]
    }

    proptest! {
        #[test]
        fn schedule_stays_sorted_after_any_mutation(mutations in prop::collection::vec(mutation(), 1..24)) {
            let base = fixed_time("2026-02-16T08:00:00Z");
            let mut store = ScheduleStore::new();

            for mutation in mutations {
                match mutation {
                    Mutation::Insert { offset_minutes, minutes } => {
                        store.insert(
                            Act::new("segment", Duration::minutes(minutes), base + Duration::minutes(offset_minutes))
                                .expect("valid act"),
                        );
                    }
                    Mutation::RemoveAt(index) => {
                        if let Some(id) = store.acts().get(index).map(Act::id) {
                            store.remove(id);
                        }
                    }
                    Mutation::Reorder(from, to) => {
                        store.reorder(from, to);
                    }
                    Mutation::StartNow { index, now_offset } => {
                        if let Some(id) = store.acts().get(index).map(Act::id) {
                            let now = base + Duration::minutes(now_offset);
                            let promoted = store.start_now(id, now).expect("known act");
                            let covering: Vec<ActId> = store
                                .acts()
                                .iter()
                                .filter(|act| act.covers(now))
                                .map(Act::id)
                                .collect();
                            prop_assert_eq!(covering, vec![promoted]);
                        }
                    }
                }

                prop_assert!(store
                    .acts()
                    .windows(2)
                    .all(|pair| pair[0].start_time() <= pair[1].start_time()));
            }
        }
    }
}
