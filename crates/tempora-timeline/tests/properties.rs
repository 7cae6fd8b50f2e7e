//! Behavioral properties of timelines and the convergence engine.

use rand::Rng;
use tempora_timeline::{
    Direction, Expr, LoopOptions, Runtime, Superposition, TemporalError, TemporalVar,
};

fn s(values: &[i64]) -> Superposition<i64> {
    Superposition::from_values(values.iter().copied())
}

/// Forward write, then the same write in reverse, outside a run.
fn round_trip(seed: i64, op: impl Fn(&TemporalVar<i64>) -> Expr<i64>) -> Superposition<i64> {
    let rt = Runtime::<i64>::new();
    let v = rt.get_or_create("v", seed);
    v.commit(op(&v));
    rt.set_entropy(Direction::Reverse);
    v.commit(op(&v));
    v.value()
}

#[test]
fn test_round_trip_each_invertible_op() {
    tempora_telemetry::init_test_tracing();

    assert_eq!(round_trip(5, |v| v.add(3)), s(&[5]));
    assert_eq!(round_trip(5, |v| v.sub(9)), s(&[5]));
    assert_eq!(round_trip(5, |v| v.mul(-4)), s(&[5]));
    assert_eq!(round_trip(12, |v| v.div(4).unwrap()), s(&[12]));
    assert_eq!(round_trip(5, |v| v.neg()), s(&[5]));
    assert_eq!(round_trip(5, |v| v.expr().rsub(2)), s(&[5]));
}

#[test]
fn test_truncating_division_is_not_replayed() {
    // 7 / 2 truncates to 3, so multiplying back cannot recover 7
    let reversed = round_trip(7, |v| v.div(2).unwrap());
    assert_ne!(reversed, s(&[6]));
    assert_eq!(reversed, s(&[1]));

    assert_eq!(round_trip(7, |v| v.div(7).unwrap()), s(&[7]));
}

#[test]
fn test_round_trip_randomized() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let seed: i64 = rng.gen_range(-1000..1000);
        let operand: i64 = rng.gen_range(1..50);
        assert_eq!(round_trip(seed, |v| v.add(operand)), s(&[seed]));
        assert_eq!(round_trip(seed, |v| v.sub(operand)), s(&[seed]));
        assert_eq!(round_trip(seed, |v| v.mul(operand)), s(&[seed]));
        assert_eq!(round_trip(seed * operand, |v| v.div(operand).unwrap()), s(&[seed * operand]));
    }
}

#[test]
fn test_round_trip_inside_run() {
    let rt = Runtime::<i64>::new();
    let v = rt.get_or_create("v", 5);
    let body_v = v.clone();
    let options = LoopOptions::default()
        .unify_on_convergence(false)
        .run_final_iteration(false);
    let report = rt
        .run_convergence_loop(
            move |_| {
                body_v.commit(body_v.add(3));
                Ok(())
            },
            options,
        )
        .unwrap();

    // reverse (no ledger yet), forward +3, reverse undoes the +3
    assert_eq!(v.slices(), vec![s(&[5]), s(&[8]), s(&[11]), s(&[8])]);
    assert_eq!(report.half_cycles, 3);
}

/// Raw history of the first `half_cycles` passes, without unifying.
fn raw_passes(half_cycles: usize) -> LoopOptions {
    LoopOptions::default()
        .unify_on_convergence(false)
        .run_final_iteration(false)
        .max_half_cycles(half_cycles)
}

#[test]
fn test_repeated_forward_writes_in_one_half_cycle() {
    let rt = Runtime::<i64>::new();
    let counter = rt.get_or_create("counter", 0);
    let label = rt.get_or_create("label", 0);
    let spread = rt.get_or_create("spread", 0);
    let picked = rt.get_or_create("picked", 0);

    let err = rt
        .run_convergence_loop(
            |pass| {
                if pass.direction == Direction::Reverse {
                    counter.assign(10);
                    label.assign(3);
                    spread.assign(s(&[1, 2]));
                    picked.assign(s(&[1, 2]));
                    return Ok(());
                }
                counter.commit(counter.add(1));
                counter.commit(counter.add(1));
                label.assign(4);
                label.assign(5);
                spread.assign(s(&[1, 2]));
                spread.commit(spread.mul(10));
                picked.assign(s(&[1, 2]));
                picked.assign(9);
                Ok(())
            },
            raw_passes(2),
        )
        .unwrap_err();
    assert!(matches!(err, TemporalError::NoConvergence { half_cycles: 2, .. }));

    // self-feedback unions into the slice opened by the first write
    assert_eq!(counter.slices(), vec![s(&[0]), s(&[10]), s(&[11, 12])]);
    assert_eq!(counter.epochs(), vec![0, 1, 2]);
    // any other write replaces it
    assert_eq!(label.slices(), vec![s(&[0]), s(&[3]), s(&[5])]);
    assert_eq!(spread.last(), s(&[1, 2, 10, 20]));
    assert_eq!(picked.last(), s(&[9]));
    assert_eq!(picked.timeline_len(), 3);
}

#[test]
fn test_cross_variable_reverse_rebuilds_from_previous_epoch() {
    let rt = Runtime::<i64>::new();
    let a = rt.get_or_create("a", 100);
    let b = rt.get_or_create("b", 0);

    let err = rt
        .run_convergence_loop(
            |pass| {
                b.commit(a.add(2));
                if pass.direction == Direction::Reverse {
                    b.commit(a.add(5));
                }
                Ok(())
            },
            raw_passes(3),
        )
        .unwrap_err();
    assert!(matches!(err, TemporalError::NoConvergence { half_cycles: 3, .. }));

    // both reverse writes of a half-cycle start from the slice before it
    assert_eq!(b.slices(), vec![s(&[0]), s(&[5]), s(&[102]), s(&[107])]);
    assert_eq!(b.epochs(), vec![0, 1, 2, 3]);
    assert_eq!(a.slices(), vec![s(&[100])]);
}

#[test]
fn test_convergence_mod_three() {
    let rt = Runtime::<i64>::new();
    let v = rt.get_or_create("v", -1);
    let body_v = v.clone();
    let report = rt
        .converge(move |_| {
            body_v.commit(body_v.add(1).rem(3)?);
            Ok(())
        })
        .unwrap();

    assert!(report.converged());
    assert_eq!(v.value(), s(&[0, 1, 2]));
}

#[test]
fn test_cross_variable_isolation() {
    let rt = Runtime::<i64>::new();
    let a = rt.get_or_create("a", 10);
    let b = rt.get_or_create("b", 20);

    a.commit(a.mul(1));
    let a_before = a.slices();
    assert_eq!(rt.ledger_depth_for(&a), 1);

    rt.set_entropy(Direction::Reverse);
    b.commit(a.add(2));

    assert_eq!(a.slices(), a_before);
    assert_eq!(a.value(), s(&[10]));
    assert!(b.slices().contains(&s(&[22])));
    assert_eq!(rt.ledger_depth_for(&a), 1);
}

#[test]
fn test_unify_all_idempotent() {
    let rt = Runtime::<i64>::new();
    let v = rt.get_or_create("v", 0);
    for n in 1..=4 {
        v.apply_committed(s(&[n]));
    }
    v.unify_all();
    let once = v.value();
    v.unify_all();
    assert_eq!(v.value(), once);
    assert_eq!(once, s(&[1, 2, 3, 4]));
}

#[test]
fn test_epoch_monotonicity() {
    let rt = Runtime::<i64>::new();
    let v = rt.get_or_create("v", -1);
    let body_v = v.clone();
    let mut passes = Vec::new();
    rt.converge(|pass| {
        passes.push(*pass);
        body_v.commit(body_v.add(1).rem(3)?);
        Ok(())
    })
    .unwrap();

    let (last, cycles) = passes.split_last().unwrap();
    for pass in cycles {
        assert_eq!(pass.epoch, pass.index as i64, "one epoch per direction change");
    }
    assert!(last.is_final);
    assert_eq!(last.direction, Direction::Forward);
    assert_eq!(last.epoch, cycles[cycles.len() - 1].epoch);

    let epochs = v.epochs();
    assert!(epochs[1..].windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_epoch_unchanged_without_flip() {
    let rt = Runtime::<i64>::new();
    let inner = rt.clone();
    let mut seen = Vec::new();
    rt.converge(|pass| {
        if !pass.is_final {
            let again = inner.set_entropy(pass.direction);
            seen.push((pass.epoch, again));
        }
        Ok(())
    })
    .unwrap();
    assert!(seen.iter().all(|(before, after)| before == after));
}
