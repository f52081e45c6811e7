//! Cross-component scenarios: whole programs driven through the trampoline,
//! exercising the call protocol, the choice-point protocol, heap rollback,
//! and the re-entrant boundary together.

use std::sync::Arc;

use parking_lot::Mutex;

use super::code::{
    Outcome, Program, Transfer, DO_FAIL, DO_NOT_REACHED, DO_REDO, DO_STOP_SUCCESS,
    NUM_BUILTIN_LABELS,
};
use super::engine::Engine;
use super::heap::HeapMark;
use super::nondet::NONDET_FIXED_SIZE;
use super::trail::TrailLoc;
use super::types::{MachineConfig, MachineError};
use super::word::{untag, Tag, Word};

fn small_config() -> MachineConfig {
    MachineConfig {
        heap_words: 256,
        solutions_heap_words: 64,
        global_heap_words: 64,
        detstack_words: 64,
        nondet_words: 128,
        heap_growable: false,
        num_engines: 1,
        trace: false,
    }
}

/// Spec scenario: a deterministic call neither reads nor writes the det
/// stack cursor; the frame reserved before the call is intact after it.
#[test]
fn test_det_call_leaves_sp_unchanged() {
    let sp_seen: Arc<Mutex<Vec<usize>>> = Arc::default();

    let mut builder = Program::builder();
    let target = builder.label("target", |e| Ok(e.proceed()));
    let sink = Arc::clone(&sp_seen);
    let cont = builder.label("cont", move |e| {
        sink.lock().push(e.regs().sp);
        // The frame is still addressable exactly as written.
        assert_eq!(e.stackvar(1)?.to_int(), 10);
        assert_eq!(e.stackvar(3)?.to_int(), 30);
        e.decr_sp(3)?;
        Ok(Transfer::Jump(DO_STOP_SUCCESS))
    });
    let sink = Arc::clone(&sp_seen);
    let entry = builder.label("entry", move |e| {
        e.incr_sp(3)?;
        e.set_stackvar(1, Word::from_int(10))?;
        e.set_stackvar(2, Word::from_int(20))?;
        e.set_stackvar(3, Word::from_int(30))?;
        sink.lock().push(e.regs().sp);
        Ok(e.call(target, cont))
    });

    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();
    assert_eq!(engine.run(entry).unwrap(), Outcome::Success);
    let seen = sp_seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
}

/// Spec scenario: a failure from a deeper computation lands on exactly the
/// redoip the surviving choice point supplied at creation, once, with maxfr
/// popped to that frame.
#[test]
fn test_backtrack_reaches_supplied_redoip_exactly_once() {
    let outer_frs: Arc<Mutex<Vec<usize>>> = Arc::default();
    let alt_hits: Arc<Mutex<Vec<usize>>> = Arc::default();

    let mut builder = Program::builder();
    let sink = Arc::clone(&alt_hits);
    let alt = builder.label("alt", move |e| {
        sink.lock().push(e.regs().maxfr);
        e.succeed_discard()
    });
    let deeper = builder.label("deeper", |e| {
        e.mkframe(DO_NOT_REACHED, 0, DO_FAIL)?;
        Ok(Transfer::Jump(DO_FAIL))
    });
    let sink = Arc::clone(&outer_frs);
    let entry = builder.label("entry", move |e| {
        e.mkframe(DO_NOT_REACHED, 0, alt)?;
        sink.lock().push(e.regs().maxfr);
        Ok(Transfer::Jump(deeper))
    });

    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();
    assert_eq!(engine.run(entry).unwrap(), Outcome::Success);

    // The alternative ran once, with maxfr popped back to the outer frame.
    assert_eq!(*alt_hits.lock(), *outer_frs.lock());
    assert_eq!(alt_hits.lock().len(), 1);
}

/// A two-clause disjunction enumerated to exhaustion: both solutions arrive
/// at the collector, then the base frame reports failure as the normal
/// "no more solutions" outcome.
#[test]
fn test_disjunction_enumerates_both_solutions() {
    let solutions: Arc<Mutex<Vec<i64>>> = Arc::default();

    let mut builder = Program::builder();
    let clause2 = builder.label("gen_c2", |e| {
        e.regs_mut().set_reg(1, Word::from_int(2))?;
        e.succeed_discard()
    });
    let clause1 = builder.label("gen_c1", |e| {
        e.regs_mut().set_reg(1, Word::from_int(1))?;
        e.succeed()
    });
    let gen = builder.label("gen", move |e| {
        e.mkframe(DO_NOT_REACHED, 0, clause2)?;
        Ok(Transfer::Jump(clause1))
    });
    let sink = Arc::clone(&solutions);
    let collect = builder.label("collect", move |e| {
        sink.lock().push(e.regs().reg(1)?.to_int());
        e.redo()
    });
    let entry = builder.label("entry", move |e| Ok(e.call(gen, collect)));

    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();
    assert_eq!(engine.run(entry).unwrap(), Outcome::Failure);
    assert_eq!(*solutions.lock(), vec![1, 2]);
}

/// modframe changes what "retry" means without a new frame: the clause the
/// frame was created with never runs once the first clause redirects it.
#[test]
fn test_modframe_redirects_the_next_alternative() {
    let solutions: Arc<Mutex<Vec<i64>>> = Arc::default();

    let mut builder = Program::builder();
    let clause3 = builder.label("c3", |e| {
        e.regs_mut().set_reg(1, Word::from_int(30))?;
        e.succeed_discard()
    });
    let clause2 = builder.label("c2", |e| {
        e.regs_mut().set_reg(1, Word::from_int(-1))?;
        e.succeed_discard()
    });
    let clause1 = builder.label("c1", move |e| {
        e.regs_mut().set_reg(1, Word::from_int(10))?;
        e.modframe(clause3)?;
        e.succeed()
    });
    let gen = builder.label("gen", move |e| {
        e.mkframe(DO_NOT_REACHED, 0, clause2)?;
        Ok(Transfer::Jump(clause1))
    });
    let sink = Arc::clone(&solutions);
    let collect = builder.label("collect", move |e| {
        sink.lock().push(e.regs().reg(1)?.to_int());
        e.redo()
    });
    let entry = builder.label("entry", move |e| Ok(e.call(gen, collect)));

    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();
    assert_eq!(engine.run(entry).unwrap(), Outcome::Failure);
    assert_eq!(*solutions.lock(), vec![10, 30]);
}

/// maxfr is non-decreasing except at fail/succeed_discard, and every
/// decrease lands exactly on the prevfr recorded at the matching mkframe.
#[test]
fn test_choice_point_monotonicity() {
    let mut engine =
        Engine::new(0, Program::builder().build_arc(), small_config()).unwrap();
    let base = engine.regs().maxfr;

    engine.mkframe(DO_NOT_REACHED, 0, DO_FAIL).unwrap();
    let fr_a = engine.regs().maxfr;
    assert!(fr_a > base);
    assert_eq!(engine.nondet().prevfr(fr_a).unwrap(), base);

    engine.mkframe(DO_NOT_REACHED, 2, DO_FAIL).unwrap();
    let fr_b = engine.regs().maxfr;
    assert!(fr_b > fr_a);
    assert_eq!(engine.nondet().prevfr(fr_b).unwrap(), fr_a);

    // succeed_discard drops exactly to B's recorded prevfr.
    engine.succeed_discard().unwrap();
    assert_eq!(engine.regs().maxfr, fr_a);

    // A new frame grows the stack again.
    engine.redo().unwrap();
    engine.mkframe(DO_NOT_REACHED, 1, DO_FAIL).unwrap();
    let fr_c = engine.regs().maxfr;
    assert!(fr_c > fr_a);

    // fail drops exactly to C's recorded prevfr, then to A's.
    engine.fail().unwrap();
    assert_eq!(engine.regs().maxfr, fr_a);
    engine.fail().unwrap();
    assert_eq!(engine.regs().maxfr, base);
}

/// Spec scenario: after a nested mkframe pair, discarding the inner frame
/// leaves the outer frame on top and the inner one unreachable.
#[test]
fn test_nested_choice_with_discard() {
    let mut engine =
        Engine::new(0, Program::builder().build_arc(), small_config()).unwrap();

    engine.mkframe(DO_NOT_REACHED, 0, DO_FAIL).unwrap();
    let fr_a = engine.regs().maxfr;
    engine.mkframe(DO_NOT_REACHED, 0, DO_FAIL).unwrap();
    let fr_b = engine.regs().maxfr;
    assert!(fr_b > fr_a);

    engine.succeed_discard().unwrap();
    assert_eq!(engine.regs().maxfr, fr_a);
    assert_eq!(engine.regs().curfr, fr_a);
    assert!(engine.regs().maxfr < fr_b);
}

/// curfr and maxfr coincide exactly while no call has returned out of the
/// newest choice point's procedure.
#[test]
fn test_curfr_tracks_active_frame_not_top() {
    let mut engine =
        Engine::new(0, Program::builder().build_arc(), small_config()).unwrap();

    engine.mkframe(DO_NOT_REACHED, 0, DO_FAIL).unwrap();
    assert_eq!(engine.regs().curfr, engine.regs().maxfr);

    // Returning a solution reactivates the caller's frame while the choice
    // point stays on top.
    engine.succeed().unwrap();
    assert_ne!(engine.regs().curfr, engine.regs().maxfr);

    // redo re-enters the top frame and the two coincide again.
    engine.redo().unwrap();
    assert_eq!(engine.regs().curfr, engine.regs().maxfr);
}

/// Spec scenario: with a det stack of k words, push k+1 times; the overflow
/// fires exactly on push k+1.
#[test]
fn test_overflow_fires_exactly_on_push_k_plus_1() {
    const K: usize = 8;

    fn spin_program() -> (std::sync::Arc<Program>, usize) {
        let mut builder = Program::builder();
        let entry = builder.label("spin", |e| {
            let n = e.regs().reg(1)?.to_int();
            if n == 0 {
                return Ok(e.proceed());
            }
            e.push(Word::ZERO)?;
            e.regs_mut().set_reg(1, Word::from_int(n - 1))?;
            Ok(e.tailcall(NUM_BUILTIN_LABELS))
        });
        assert_eq!(entry, NUM_BUILTIN_LABELS);
        (builder.build_arc(), entry)
    }

    let config = MachineConfig {
        detstack_words: K,
        ..small_config()
    };

    // k pushes fit.
    let (program, entry) = spin_program();
    let mut engine = Engine::new(0, program, config.clone()).unwrap();
    engine.regs_mut().set_reg(1, Word::from_int(K as i64)).unwrap();
    assert_eq!(engine.run(entry).unwrap(), Outcome::Success);
    assert_eq!(engine.regs().sp, K);

    // k+1 pushes overflow, on the last push only.
    let (program, entry) = spin_program();
    let mut engine = Engine::new(0, program, config).unwrap();
    engine.regs_mut().set_reg(1, Word::from_int(K as i64 + 1)).unwrap();
    assert!(matches!(
        engine.run(entry),
        Err(MachineError::ZoneOverflow { zone: "detstack", .. })
    ));
    // The first k pushes all landed; the counter shows push k+1 was the
    // one that died.
    assert_eq!(engine.regs().sp, K);
    assert_eq!(engine.regs().reg(1).unwrap().to_int(), 1);
}

/// Speculative heap growth is rolled back when the alternative that made it
/// is retried: the mark parked in the choice-point frame restores hp.
#[test]
fn test_heap_rollback_across_backtrack() {
    let hp_after: Arc<Mutex<Vec<usize>>> = Arc::default();

    let mut builder = Program::builder();
    let sink = Arc::clone(&hp_after);
    let alt = builder.label("alt", move |e| {
        let mark = HeapMark::from_word(e.framevar(0)?);
        e.heap_mut().restore(mark)?;
        sink.lock().push(e.heap().hp());
        e.succeed_discard()
    });
    let entry = builder.label("entry", move |e| {
        e.mkframe(DO_NOT_REACHED, 1, alt)?;
        let mark = e.heap().mark();
        e.set_framevar(0, mark.to_word())?;
        // Speculative allocation the retry must discard.
        e.heap_mut().allocate(Tag::new(0), 6)?;
        Ok(Transfer::Jump(DO_REDO))
    });

    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();
    engine.heap_mut().allocate(Tag::new(0), 2).unwrap();
    assert_eq!(engine.run(entry).unwrap(), Outcome::Success);
    assert_eq!(*hp_after.lock(), vec![2]);
    assert_eq!(engine.heap().hp(), 2);
}

/// retry rewinds maxfr/curfr to an ancestor, undoes trailed updates, and
/// re-enters the ancestor's recorded entry label.
#[test]
fn test_retry_reexecutes_ancestor_with_trail_undone() {
    let mut builder = Program::builder();
    let entry = builder.label("redoable", |e| Ok(e.proceed()));
    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();

    engine.mkframe(entry, 0, DO_FAIL).unwrap();
    let fr = engine.regs().maxfr;
    let mark = engine.trail().cursor();

    // A trailed destructive update made after the choice point.
    let ptr = engine.heap_mut().allocate(Tag::new(0), 1).unwrap();
    engine.heap_mut().set_field(ptr, 0, Word::from_int(1)).unwrap();
    let old = engine.heap().field(ptr, 0).unwrap();
    engine.trail_mut().record(TrailLoc::Heap(untag(ptr) as usize), old);
    engine.heap_mut().set_field(ptr, 0, Word::from_int(2)).unwrap();

    let transfer = engine.retry(fr, mark).unwrap();
    assert_eq!(transfer, Transfer::Jump(entry));
    assert_eq!(engine.regs().maxfr, fr);
    assert_eq!(engine.regs().curfr, fr);
    assert_eq!(engine.heap().field(ptr, 0).unwrap().to_int(), 1);

    // Re-executing from the entry runs to completion.
    assert_eq!(engine.run(entry).unwrap(), Outcome::Success);
}

/// An exception thrown below live choice points unwinds to the boundary
/// with every special register restored, maxfr and curfr included.
#[test]
fn test_boundary_restores_choice_point_registers() {
    let mut builder = Program::builder();
    let entry = builder.label("entry", |e| {
        e.mkframe(DO_NOT_REACHED, 1, DO_FAIL)?;
        e.incr_sp(2)?;
        Ok(e.throw(Word::from_int(99)))
    });
    let mut engine = Engine::new(0, builder.build_arc(), small_config()).unwrap();

    let maxfr_before = engine.regs().maxfr;
    let curfr_before = engine.regs().curfr;
    let sp_before = engine.regs().sp;

    let result = engine.call_boundary(entry);
    assert!(matches!(result, Err(MachineError::Exception(w)) if w == Word::from_int(99)));
    assert_eq!(engine.regs().maxfr, maxfr_before);
    assert_eq!(engine.regs().curfr, curfr_before);
    assert_eq!(engine.regs().sp, sp_before);
}

/// The save area of a frame is sized by its mkframe: the frame spans from
/// prevfr to fr, and slots index into exactly that span.
#[test]
fn test_frame_extent_matches_mkframe_size() {
    let mut engine =
        Engine::new(0, Program::builder().build_arc(), small_config()).unwrap();
    let base = engine.regs().maxfr;

    engine.mkframe(DO_NOT_REACHED, 3, DO_FAIL).unwrap();
    let fr = engine.regs().maxfr;
    assert_eq!(fr - base, NONDET_FIXED_SIZE + 3);

    for k in 0..3 {
        engine.set_framevar(k, Word::from_int(k as i64)).unwrap();
    }
    for k in 0..3 {
        assert_eq!(engine.framevar(k).unwrap().to_int(), k as i64);
    }
    assert!(engine.framevar(3).is_err());
}
