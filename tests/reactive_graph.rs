use skerry::{batch, effect, effect_scope, memo, signal, untrack};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn effect_reruns_only_for_its_own_dependencies() {
    let a = signal(0);
    let b = signal(0);
    let a_runs = Rc::new(Cell::new(0));
    let b_runs = Rc::new(Cell::new(0));

    let (a2, ar) = (a.clone(), a_runs.clone());
    let _ea = effect(move || {
        let _ = a2.get();
        ar.set(ar.get() + 1);
    });
    let (b2, br) = (b.clone(), b_runs.clone());
    let _eb = effect(move || {
        let _ = b2.get();
        br.set(br.get() + 1);
    });

    a.set(1);
    a.set(2);
    assert_eq!(a_runs.get(), 3);
    assert_eq!(b_runs.get(), 1);
}

#[test]
fn batch_coalesces_multiple_writes_into_one_run() {
    let a = signal(0);
    let b = signal(0);
    let runs = Rc::new(Cell::new(0));
    let sum = Rc::new(Cell::new(0));

    let (a2, b2, r2, s2) = (a.clone(), b.clone(), runs.clone(), sum.clone());
    let _e = effect(move || {
        s2.set(a2.get() + b2.get());
        r2.set(r2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    batch(|| {
        a.set(10);
        b.set(20);
        a.set(11);
    });
    assert_eq!(runs.get(), 2);
    assert_eq!(sum.get(), 31);
}

#[test]
fn memo_equality_stops_propagation() {
    let n = signal(1);
    let runs = Rc::new(Cell::new(0));

    let n2 = n.clone();
    let parity = memo(move || n2.get() % 2);

    let (p2, r2) = (parity.clone(), runs.clone());
    let _e = effect(move || {
        let _ = p2.get();
        r2.set(r2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    // 1 -> 3: parity unchanged, the effect must not run.
    n.set(3);
    assert_eq!(runs.get(), 1);

    n.set(4);
    assert_eq!(runs.get(), 2);
}

#[test]
fn untrack_reads_add_no_dependencies() {
    let tracked = signal(0);
    let ignored = signal(0);
    let runs = Rc::new(Cell::new(0));

    let (t2, i2, r2) = (tracked.clone(), ignored.clone(), runs.clone());
    let _e = effect(move || {
        let _ = t2.get();
        let _ = untrack(|| i2.get());
        r2.set(r2.get() + 1);
    });
    assert_eq!(runs.get(), 1);

    ignored.set(5);
    assert_eq!(runs.get(), 1);
    tracked.set(5);
    assert_eq!(runs.get(), 2);
}

/// Two scopes whose effects feed each other's inputs must settle in a
/// bounded number of runs, not ping-pong until the loop cap.
#[test]
fn cross_scope_feedback_converges_quickly() {
    let raw = signal(25);
    let clamped = signal(0);
    let display = signal(String::new());
    let clamp_runs = Rc::new(Cell::new(0));
    let display_runs = Rc::new(Cell::new(0));

    let producer = effect_scope(false);
    producer.run(|| {
        let (raw2, clamped2, cr) = (raw.clone(), clamped.clone(), clamp_runs.clone());
        let _e = effect(move || {
            cr.set(cr.get() + 1);
            clamped2.set(raw2.get().min(10));
        });
    });

    let consumer = effect_scope(false);
    consumer.run(|| {
        let (clamped2, display2, dr) = (clamped.clone(), display.clone(), display_runs.clone());
        let _e = effect(move || {
            dr.set(dr.get() + 1);
            display2.set(format!("{}", clamped2.get()));
        });
    });

    assert_eq!(display.get(), "10");

    // Writes above the clamp leave `clamped` unchanged; equality cuts the
    // chain before the consumer scope sees anything.
    raw.set(30);
    raw.set(40);
    assert_eq!(display.get(), "10");

    raw.set(3);
    assert_eq!(display.get(), "3");

    assert!(clamp_runs.get() < 10, "clamp ran {} times", clamp_runs.get());
    assert!(
        display_runs.get() < 10,
        "display ran {} times",
        display_runs.get()
    );
}

#[test]
fn scope_stop_is_complete_and_final() {
    let input = signal(0);
    let runs = Rc::new(Cell::new(0));

    let scope = effect_scope(false);
    scope.run(|| {
        let (i2, r2) = (input.clone(), runs.clone());
        let _e = effect(move || {
            let _ = i2.get();
            r2.set(r2.get() + 1);
        });
        // Nested scope with its own effect.
        let inner = effect_scope(false);
        inner.run(|| {
            let (i3, r3) = (input.clone(), runs.clone());
            let _e = effect(move || {
                let _ = i3.get();
                r3.set(r3.get() + 1);
            });
        });
    });
    assert_eq!(runs.get(), 2);

    input.set(1);
    assert_eq!(runs.get(), 4);

    scope.stop();
    input.set(2);
    assert_eq!(runs.get(), 4);
}
