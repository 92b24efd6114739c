//! Property-based tests for `state` and `stepper`.
//!
//! 1. Phase completions never change the total token count
//! 2. advance() keeps the total and never goes negative over many steps
//! 3. Idle area is bounded by max pool times elapsed time
//! 4. inject_arrival rejects exactly when the pool is empty
//! 5. Admission moves exactly one token pool → phase

use proptest::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use poolsim_core::arrival::JobClass;
use poolsim_core::state::{EntryWeights, PHASE_COUNT, Phase, SystemState};
use poolsim_core::stepper::{Admission, StochasticStepper, inject_arrival};

// =============================================================================
// Strategies
// =============================================================================

fn arb_state() -> impl Strategy<Value = SystemState> {
    (0u32..30, prop::array::uniform4(0u32..15))
        .prop_map(|(pool, phases)| SystemState::from_parts(pool, phases))
}

fn arb_class() -> impl Strategy<Value = JobClass> {
    prop_oneof![
        Just(JobClass::One),
        Just(JobClass::Two),
        Just(JobClass::Three),
    ]
}

fn arb_weights() -> impl Strategy<Value = EntryWeights> {
    let row = prop::array::uniform4(0.0f64..5.0)
        .prop_filter("at least one positive weight", |w| w.iter().sum::<f64>() > 0.0);
    (row.clone(), row.clone(), row).prop_map(|(class1, class2, class3)| EntryWeights {
        class1,
        class2,
        class3,
    })
}

fn arb_bph() -> impl Strategy<Value = f64> {
    prop_oneof![Just(10.0), 0.5f64..50.0]
}

// =============================================================================
// Conservation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn completion_preserves_total(state in arb_state(), idx in 0usize..PHASE_COUNT) {
        let mut s = state;
        let phase = Phase::from_index(idx).unwrap();
        let before = s.total();
        match s.complete(phase) {
            Ok(()) => prop_assert_eq!(s.total(), before),
            Err(_) => {
                prop_assert_eq!(state.occupancy(phase), 0);
                prop_assert_eq!(s, state);
            }
        }
    }

    #[test]
    fn advance_preserves_total(
        state in arb_state(),
        bph in arb_bph(),
        seed in any::<u64>(),
        steps in prop::collection::vec(0.0f64..5.0, 1..20),
    ) {
        let stepper = StochasticStepper::new(bph).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut s = state;
        let total = s.total();
        let mut t = 0.0;
        for dt in steps {
            let delta = stepper.advance(&mut s, t, t + dt, &mut rng).unwrap();
            prop_assert!(delta.idle_area >= 0.0);
            prop_assert!((delta.elapsed - dt).abs() < 1e-9 || dt == 0.0);
            t += dt;
            prop_assert_eq!(s.total(), total);
        }
    }

    #[test]
    fn idle_area_bounded_by_pool_ceiling(
        state in arb_state(),
        seed in any::<u64>(),
        dt in 0.0f64..20.0,
    ) {
        let stepper = StochasticStepper::new(10.0).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut s = state;
        let ceiling = s.total() as f64;
        let floor = f64::from(state.pool());
        let delta = stepper.advance(&mut s, 0.0, dt, &mut rng).unwrap();
        // The pool only grows between arrivals.
        prop_assert!(delta.idle_area <= ceiling * dt + 1e-9);
        prop_assert!(delta.idle_area >= floor * dt - 1e-9);
        prop_assert!(s.pool() >= state.pool());
    }
}

// =============================================================================
// Admission
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn rejects_iff_pool_empty(
        state in arb_state(),
        class in arb_class(),
        weights in arb_weights(),
        seed in any::<u64>(),
    ) {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let mut s = state;
        let outcome = inject_arrival(&mut s, class, &weights, &mut rng).unwrap();
        if state.pool() == 0 {
            prop_assert_eq!(outcome, Admission::Rejected);
            prop_assert_eq!(s, state);
        } else {
            let Admission::Admitted(phase) = outcome else {
                return Err(TestCaseError::fail("non-empty pool rejected"));
            };
            prop_assert!(weights.for_class(class)[phase.index()] > 0.0);
            prop_assert_eq!(s.pool(), state.pool() - 1);
            prop_assert_eq!(s.occupancy(phase), state.occupancy(phase) + 1);
            prop_assert_eq!(s.total(), state.total());
        }
    }
}
