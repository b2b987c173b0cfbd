use ardustat::{boundary, segment_and_integrate, CycleKind, Trace};
use proptest::prelude::*;

fn current_sample() -> impl Strategy<Value = f64> {
    prop_oneof![
        1 => Just(0.0),
        4 => -500.0..500.0f64,
    ]
}

fn trace_strategy() -> impl Strategy<Value = Trace> {
    prop::collection::vec((0.0..10.0f64, 2.5..4.5f64, current_sample()), 2..200).prop_map(
        |rows| {
            let mut t = 0.0;
            let mut time = Vec::with_capacity(rows.len());
            let mut voltage = Vec::with_capacity(rows.len());
            let mut current = Vec::with_capacity(rows.len());
            for (dt, v, i) in rows {
                time.push(t);
                t += dt / 3600.0;
                voltage.push(v);
                current.push(i);
            }
            Trace::new(time, voltage, current).unwrap()
        },
    )
}

proptest! {
    #[test]
    fn analysis_is_deterministic(trace in trace_strategy()) {
        let first = segment_and_integrate(&trace).unwrap();
        let second = segment_and_integrate(&trace).unwrap();
        prop_assert_eq!(first.cycle_count(), second.cycle_count());
        for (a, b) in first.cycles().iter().zip(second.cycles().iter()) {
            prop_assert_eq!(a.start_index, b.start_index);
            prop_assert_eq!(a.len(), b.len());
            prop_assert_eq!(a.capacity.to_bits(), b.capacity.to_bits());
            prop_assert_eq!(a.power.to_bits(), b.power.to_bits());
        }
    }

    #[test]
    fn cycle_currents_are_non_negative(trace in trace_strategy()) {
        let result = segment_and_integrate(&trace).unwrap();
        for cycle in result.cycles() {
            prop_assert!(cycle.current.iter().all(|c| *c >= 0.0));
            prop_assert!(cycle.capacity >= 0.0);
            prop_assert!(!cycle.is_empty());
        }
    }

    #[test]
    fn figures_follow_cycle_order(trace in trace_strategy()) {
        let result = segment_and_integrate(&trace).unwrap();
        prop_assert_eq!(result.charge.len(), result.charge_capacity.len());
        prop_assert_eq!(result.discharge.len(), result.discharge_power.len());
        for (k, cycle) in result.charge.iter().enumerate() {
            prop_assert_eq!(cycle.kind, CycleKind::Charge);
            prop_assert_eq!(cycle.capacity.to_bits(), result.charge_capacity[k].to_bits());
            prop_assert_eq!(cycle.power.to_bits(), result.charge_power[k].to_bits());
        }
        for (k, cycle) in result.discharge.iter().enumerate() {
            prop_assert_eq!(cycle.kind, CycleKind::Discharge);
            prop_assert_eq!(cycle.capacity.to_bits(), result.discharge_capacity[k].to_bits());
            prop_assert_eq!(cycle.power.to_bits(), result.discharge_power[k].to_bits());
        }
        for pair in result.charge.windows(2).chain(result.discharge.windows(2)) {
            prop_assert!(pair[0].end_index() < pair[1].start_index);
        }
    }

    #[test]
    fn cycles_tile_the_trace_up_to_the_discarded_tail(trace in trace_strategy()) {
        let result = segment_and_integrate(&trace).unwrap();
        let mut next = 0;
        for cycle in result.cycles() {
            prop_assert_eq!(cycle.start_index, next);
            next = cycle.end_index() + 1;
        }
        prop_assert_eq!(next + result.discarded_samples, trace.len());
    }

    #[test]
    fn boundaries_only_at_strict_sign_changes(trace in trace_strategy()) {
        let result = segment_and_integrate(&trace).unwrap();
        let current = trace.current();
        for cycle in result.cycles() {
            let end = cycle.end_index();
            prop_assert_eq!(boundary(current[end], current[end + 1]), Some(cycle.kind));
            prop_assert!(current[end] != 0.0 && current[end + 1] != 0.0);
            for i in cycle.start_index..end {
                prop_assert_eq!(boundary(current[i], current[i + 1]), None);
            }
        }
    }
}
