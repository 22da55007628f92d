use crate::bundler::relay::{RelaySubmitter, TxOutcome};
use crate::errors::{BundlerError, Result};
use crate::models::result::{Confirmation, SubmissionPath};
use crate::models::strategy::{GroupPath, StealthMode};
use futures::future::join_all;
use log::{debug, info};
use rand::Rng;
use solana_sdk::{signature::Signature, transaction::VersionedTransaction};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Planning,
    Executing(usize),
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealthGroup {
    /// Member indices into the launch's wallet order.
    pub members: Vec<usize>,
    pub path: GroupPath,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct StealthPlan {
    pub groups: Vec<StealthGroup>,
    /// Group indices per slot, in slot order.
    pub slots: Vec<Vec<usize>>,
    /// Wait after each slot but the last.
    pub slot_gaps: Vec<Duration>,
    pub member_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct StealthTiming {
    pub block_interval: Duration,
    pub block_jitter: Duration,
    /// Randomized per-group delays and block gaps.
    pub jitter: bool,
}

impl Default for StealthTiming {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_millis(400),
            block_jitter: Duration::from_millis(150),
            jitter: true,
        }
    }
}

impl StealthTiming {
    pub fn immediate() -> Self {
        Self {
            block_interval: Duration::ZERO,
            block_jitter: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn with_jitter(self, jitter: bool) -> Self {
        Self { jitter, ..self }
    }
}

pub struct StealthScheduler {
    submitter: Arc<RelaySubmitter>,
    timing: StealthTiming,
    state: Mutex<SchedulerState>,
}

fn signature_of(tx: &VersionedTransaction) -> Option<String> {
    tx.signatures.first().map(Signature::to_string)
}

impl StealthScheduler {
    pub fn new(submitter: Arc<RelaySubmitter>, timing: StealthTiming) -> Self {
        Self {
            submitter,
            timing,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state.lock().map(|s| *s).unwrap_or(SchedulerState::Idle)
    }

    fn set_state(&self, next: SchedulerState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    /// Partitions members into groups sized by the mode's profile; the last group
    /// takes whatever remains. Groups are laid over `spread_blocks` slots,
    /// `ceil(groups / spread_blocks)` per slot.
    pub fn plan<R: Rng + ?Sized>(&self, member_count: usize, mode: StealthMode, rng: &mut R) -> Result<StealthPlan> {
        let profile = mode
            .profile()
            .ok_or_else(|| BundlerError::Config("stealth plan requested without a stealth mode".to_string()))?;
        if member_count == 0 {
            return Err(BundlerError::Config("stealth plan needs at least one member".to_string()));
        }
        self.set_state(SchedulerState::Planning);

        let mut groups = Vec::new();
        let mut next = 0;
        while next < member_count {
            let size = rng
                .gen_range(profile.min_group..=profile.max_group)
                .min(member_count - next);
            let delay = if self.timing.jitter {
                Duration::from_millis(rng.gen_range(profile.group_jitter_ms.clone()))
            } else {
                Duration::ZERO
            };
            groups.push(StealthGroup {
                members: (next..next + size).collect(),
                path: if size > 1 { GroupPath::AtomicBundle } else { GroupPath::Individual },
                delay,
            });
            next += size;
        }

        let spread = profile.spread_blocks.max(1);
        let per_slot = (groups.len() + spread - 1) / spread;
        let slots: Vec<Vec<usize>> = (0..groups.len())
            .collect::<Vec<_>>()
            .chunks(per_slot)
            .map(|c| c.to_vec())
            .collect();

        let slot_gaps = (1..slots.len()).map(|_| self.block_gap(rng)).collect();
        info!(
            "Stealth plan ({:?}): {} members in {} groups over {} slots",
            mode,
            member_count,
            groups.len(),
            slots.len()
        );
        Ok(StealthPlan {
            groups,
            slots,
            slot_gaps,
            member_count,
        })
    }

    fn block_gap<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let base = self.timing.block_interval.as_millis() as i64;
        let jitter = self.timing.block_jitter.as_millis() as i64;
        if !self.timing.jitter || jitter == 0 {
            return self.timing.block_interval;
        }
        Duration::from_millis((base + rng.gen_range(-jitter..=jitter)).max(0) as u64)
    }

    /// Runs the plan slot by slot; groups inside a slot go concurrently.
    /// `member_txs[i]` is member `i`'s signed trade, `tips[g]` the tip of atomic group `g`.
    /// Returns exactly one outcome per member, in member order.
    pub async fn execute(
        &self,
        plan: &StealthPlan,
        member_txs: &[VersionedTransaction],
        tips: &[Option<VersionedTransaction>],
    ) -> Result<Vec<TxOutcome>> {
        if member_txs.len() != plan.member_count {
            return Err(BundlerError::Build(format!(
                "{} transactions for {} planned members",
                member_txs.len(),
                plan.member_count
            )));
        }

        let mut outcomes: Vec<Option<TxOutcome>> = vec![None; plan.member_count];
        for (slot_idx, slot) in plan.slots.iter().enumerate() {
            self.set_state(SchedulerState::Executing(slot_idx));
            debug!("Stealth slot {}: groups {:?}", slot_idx, slot);

            let results = join_all(slot.iter().map(|g| {
                let group = &plan.groups[*g];
                let tip = tips.get(*g).and_then(|t| t.as_ref());
                self.run_group(group, member_txs, tip)
            }))
            .await;
            for (member, outcome) in results.into_iter().flatten() {
                outcomes[member] = Some(outcome);
            }

            if let Some(gap) = plan.slot_gaps.get(slot_idx) {
                if !gap.is_zero() {
                    tokio::time::sleep(*gap).await;
                }
            }
        }
        self.set_state(SchedulerState::Done);

        Ok(outcomes
            .into_iter()
            .enumerate()
            .map(|(i, o)| {
                o.unwrap_or_else(|| TxOutcome {
                    signature: signature_of(&member_txs[i]),
                    success: false,
                    error: Some("member was not scheduled".to_string()),
                    path: SubmissionPath::NotSubmitted,
                    confirmation: Confirmation::Unconfirmed,
                    confirmation_ms: None,
                })
            })
            .collect())
    }

    async fn run_group(
        &self,
        group: &StealthGroup,
        member_txs: &[VersionedTransaction],
        tip: Option<&VersionedTransaction>,
    ) -> Vec<(usize, TxOutcome)> {
        if !group.delay.is_zero() {
            tokio::time::sleep(group.delay).await;
        }
        let tip = match group.path {
            GroupPath::AtomicBundle => tip,
            GroupPath::Individual => None,
        };
        let txs: Vec<VersionedTransaction> = group.members.iter().map(|m| member_txs[*m].clone()).collect();
        let outcomes = self.submitter.submit_group(tip, &txs).await;
        group.members.iter().copied().zip(outcomes).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::builder::sign_v0;
    use crate::bundler::relay::{FallbackPolicy, SubmissionStrategy};
    use crate::chain::ConfirmTiming;
    use crate::test_support::{MockChain, MockRelay};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use solana_sdk::{hash::Hash, signature::Keypair, signer::Signer, system_instruction};

    fn scheduler(relay: MockRelay) -> StealthScheduler {
        scheduler_with(relay, StealthTiming::immediate())
    }

    fn scheduler_with(relay: MockRelay, stealth_timing: StealthTiming) -> StealthScheduler {
        let policy = FallbackPolicy::new(vec![SubmissionStrategy::Relay {
            url: "r1".into(),
            timeout: Duration::from_millis(50),
        }]);
        let timing = ConfirmTiming {
            window: Duration::from_millis(20),
            poll: Duration::from_millis(5),
        };
        let submitter = RelaySubmitter::new(Arc::new(MockChain::default()), Arc::new(relay), policy, timing, 0);
        StealthScheduler::new(Arc::new(submitter), stealth_timing)
    }

    fn signed(n: usize) -> Vec<VersionedTransaction> {
        (0..n)
            .map(|_| {
                let kp = Keypair::new();
                let ix = system_instruction::transfer(&kp.pubkey(), &Keypair::new().pubkey(), 1);
                sign_v0(&[&kp], &[ix], &[], Hash::new_unique()).unwrap()
            })
            .collect()
    }

    #[test]
    fn plan_spreads_groups_over_slots() {
        let sched = scheduler(MockRelay::accepting());
        let mut rng = StdRng::seed_from_u64(7);
        let plan = sched.plan(10, StealthMode::Medium, &mut rng).unwrap();
        assert_eq!(sched.state(), SchedulerState::Planning);

        let members: Vec<usize> = plan.groups.iter().flat_map(|g| g.members.clone()).collect();
        assert_eq!(members, (0..10).collect::<Vec<_>>());
        let per_slot = (plan.groups.len() + 2) / 3;
        assert!(plan.slots.len() <= 3);
        assert!(plan.slots.iter().all(|s| s.len() <= per_slot));
        assert_eq!(plan.slot_gaps.len(), plan.slots.len() - 1);
        for g in &plan.groups[..plan.groups.len() - 1] {
            assert!((2..=3).contains(&g.members.len()));
            assert_eq!(g.path, GroupPath::AtomicBundle);
        }
    }

    #[test]
    fn more_groups_than_fit_in_one_slot_use_several_slots() {
        let sched = scheduler(MockRelay::accepting());
        let mut rng = StdRng::seed_from_u64(3);
        // Aggressive groups hold at most two members, so twelve members make at least six groups.
        let plan = sched.plan(12, StealthMode::Aggressive, &mut rng).unwrap();
        let spread = StealthMode::Aggressive.profile().unwrap().spread_blocks;
        let per_slot = (plan.groups.len() + spread - 1) / spread;

        assert!(plan.groups.len() > per_slot);
        assert!(plan.slots.len() > 1);
        assert!(plan.slots.iter().all(|s| s.len() <= per_slot));
        let scheduled: Vec<usize> = plan.slots.iter().flatten().copied().collect();
        assert_eq!(scheduled, (0..plan.groups.len()).collect::<Vec<_>>());
    }

    #[test]
    fn jitter_off_gives_fixed_timing() {
        let timing = StealthTiming::default().with_jitter(false);
        let sched = scheduler_with(MockRelay::accepting(), timing);
        let mut rng = StdRng::seed_from_u64(9);
        let plan = sched.plan(10, StealthMode::Light, &mut rng).unwrap();

        assert!(plan.groups.iter().all(|g| g.delay.is_zero()));
        assert!(!plan.slot_gaps.is_empty());
        assert!(plan.slot_gaps.iter().all(|gap| *gap == timing.block_interval));
    }

    #[test]
    fn jitter_on_delays_groups_within_profile() {
        let sched = scheduler_with(MockRelay::accepting(), StealthTiming::default());
        let mut rng = StdRng::seed_from_u64(9);
        let plan = sched.plan(10, StealthMode::Light, &mut rng).unwrap();
        let range = StealthMode::Light.profile().unwrap().group_jitter_ms;

        for group in &plan.groups {
            assert!(range.contains(&(group.delay.as_millis() as u64)));
        }
    }

    #[test]
    fn none_mode_has_no_plan() {
        let sched = scheduler(MockRelay::accepting());
        let mut rng = StdRng::seed_from_u64(7);
        assert!(sched.plan(4, StealthMode::None, &mut rng).is_err());
    }

    #[tokio::test]
    async fn every_member_gets_exactly_one_outcome() {
        let sched = scheduler(MockRelay::accepting());
        let mut rng = StdRng::seed_from_u64(11);
        let plan = sched.plan(9, StealthMode::Aggressive, &mut rng).unwrap();
        let txs = signed(9);
        let tips: Vec<Option<VersionedTransaction>> = plan
            .groups
            .iter()
            .map(|g| (g.path == GroupPath::AtomicBundle).then(|| signed(1).remove(0)))
            .collect();

        let outcomes = sched.execute(&plan, &txs, &tips).await.unwrap();
        assert_eq!(sched.state(), SchedulerState::Done);
        assert_eq!(outcomes.len(), 9);
        assert!(outcomes.iter().all(|o| o.success));
        for group in &plan.groups {
            for m in &group.members {
                match group.path {
                    GroupPath::AtomicBundle => assert!(matches!(outcomes[*m].path, SubmissionPath::AtomicBundle { .. })),
                    GroupPath::Individual => assert_eq!(outcomes[*m].path, SubmissionPath::Individual),
                }
            }
        }
    }

    #[tokio::test]
    async fn failed_group_bundle_falls_back_to_individual_sends() {
        let sched = scheduler(MockRelay::failing(&["r1"]));
        let mut rng = StdRng::seed_from_u64(5);
        let plan = sched.plan(6, StealthMode::Light, &mut rng).unwrap();
        let txs = signed(6);
        let tips: Vec<Option<VersionedTransaction>> = plan.groups.iter().map(|_| Some(signed(1).remove(0))).collect();

        let outcomes = sched.execute(&plan, &txs, &tips).await.unwrap();
        assert_eq!(outcomes.len(), 6);
        assert!(outcomes.iter().all(|o| o.success && o.path == SubmissionPath::Individual));
    }
}
