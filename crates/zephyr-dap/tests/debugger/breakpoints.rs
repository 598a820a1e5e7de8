//! Breakpoint engine tests

use super::*;
use pretty_assertions::assert_eq;
use zephyr_dap::protocol::{FunctionBreakpoint, Source, SourceBreakpoint};
use zephyr_dap::refs::{breakpoint_id, script_reference};
use zephyr_dap::DebugError;

fn main_source() -> Source {
    Source {
        path: Some(MAIN_SCRIPT.to_string()),
        origin: Some("game.zpk".to_string()),
        ..Source::default()
    }
}

fn lines(requested: &[i64]) -> Vec<SourceBreakpoint> {
    requested
        .iter()
        .map(|&line| SourceBreakpoint {
            line,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: None,
        })
        .collect()
}

fn func_breakpoints(names: &[&str]) -> Vec<FunctionBreakpoint> {
    names
        .iter()
        .map(|&name| FunctionBreakpoint {
            name: name.to_string(),
            condition: None,
            hit_condition: None,
        })
        .collect()
}

#[test]
fn set_source_breakpoints_verifies_each_line() {
    let fx = Fixture::new();
    let verified = fx
        .debugger
        .breakpoints()
        .set_source_breakpoints(&main_source(), &lines(&[42, 10]))
        .unwrap();

    let reference = script_reference(MAIN_QUALIFIED);
    assert_eq!(verified.len(), 2);
    assert!(verified.iter().all(|bp| bp.verified));
    assert_eq!(verified[0].id, Some(breakpoint_id(reference, 42)));
    assert_eq!(verified[0].line, Some(42));
    assert_eq!(
        fx.debugger.breakpoints().source_breakpoint_count(reference),
        2
    );
}

#[test]
fn resetting_replaces_prior_records() {
    let fx = Fixture::new();
    let bp = fx.debugger.breakpoints();
    bp.set_source_breakpoints(&main_source(), &lines(&[10, 11, 12]))
        .unwrap();
    bp.set_source_breakpoints(&main_source(), &lines(&[42]))
        .unwrap();
    let reference = script_reference(MAIN_QUALIFIED);
    assert_eq!(bp.source_breakpoint_count(reference), 1);
}

#[test]
fn unresolvable_source_reports_not_loaded() {
    let fx = Fixture::new();
    let missing = Source {
        path: Some("scripts/ghost.zs".to_string()),
        ..Source::default()
    };
    let err = fx
        .debugger
        .breakpoints()
        .set_source_breakpoints(&missing, &lines(&[1]))
        .unwrap_err();
    assert!(matches!(err, DebugError::NotLoaded(_)));
}

#[test]
fn hit_fires_once_per_line_visit() {
    let fx = Fixture::new();
    let bp = fx.debugger.breakpoints();
    bp.set_source_breakpoints(&main_source(), &lines(&[42]))
        .unwrap();

    // Line 42 spans instructions 2..=6 of Level.Update.
    assert!(!bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.update_fn, 1)])));
    assert!(bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.update_fn, 2)])));
    for instruction in 3..=6 {
        assert!(
            !bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.update_fn, instruction)])),
            "must not re-fire while the PC stays on the line"
        );
    }
    // Leaving the line clears the suppression; coming back fires again.
    assert!(!bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.update_fn, 7)])));
    assert!(bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.update_fn, 2)])));
}

#[test]
fn native_top_frame_never_matches_source_breakpoints() {
    let fx = Fixture::new();
    let bp = fx.debugger.breakpoints();
    bp.set_source_breakpoints(&main_source(), &lines(&[42]))
        .unwrap();
    assert!(!bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.die_fn, 0)])));
}

#[test]
fn no_breakpoints_means_no_hits() {
    let fx = Fixture::new();
    let bp = fx.debugger.breakpoints();
    assert!(!bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.update_fn, 2)])));
}

#[test]
fn function_breakpoint_resolves_case_insensitively() {
    let fx = Fixture::new();
    let reply = fx
        .debugger
        .breakpoints()
        .set_function_breakpoints(&func_breakpoints(&["actor.SHOOT"]));
    assert_eq!(reply.len(), 1);
    assert!(reply[0].verified);
    // Script function records anchor at the first line-table entry.
    assert_eq!(reply[0].line, Some(20));
    assert_eq!(
        reply[0].id,
        Some(breakpoint_id(script_reference(ACTORS_QUALIFIED), 20))
    );

    let bp = fx.debugger.breakpoints();
    assert!(bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.shoot_fn, 0)])));
    // Same frame, next instruction: already reported.
    assert!(!bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.shoot_fn, 1)])));
}

#[test]
fn native_function_breakpoint_anchors_at_line_one() {
    let fx = Fixture::new();
    let reply = fx
        .debugger
        .breakpoints()
        .set_function_breakpoints(&func_breakpoints(&["Actor.Die"]));
    assert!(reply[0].verified);
    assert_eq!(reply[0].line, Some(1));
    assert_eq!(
        reply[0].id,
        Some(breakpoint_id(script_reference(ACTORS_QUALIFIED), 1))
    );

    // Fires even though the frame is native.
    let bp = fx.debugger.breakpoints();
    assert!(bp.is_at_breakpoint(&stack_of(vec![frame_at(1, &fx.die_fn, 0)])));
}

#[test]
fn malformed_and_unknown_function_names_are_rejected_per_entry() {
    let fx = Fixture::new();
    let reply = fx.debugger.breakpoints().set_function_breakpoints(&func_breakpoints(&[
        "NoDotHere",
        "Too.Many.Dots",
        "Actor.Missing",
        "Actor.Shoot",
    ]));
    assert_eq!(reply.len(), 4);
    assert!(!reply[0].verified);
    assert!(!reply[1].verified);
    assert!(!reply[2].verified);
    assert!(reply[3].verified);
    assert!(reply[0].message.as_deref().unwrap().contains("unknown function"));
}

#[test]
fn instruction_breakpoints_are_not_supported() {
    let fx = Fixture::new();
    let err = fx
        .debugger
        .breakpoints()
        .set_instruction_breakpoints()
        .unwrap_err();
    assert!(matches!(err, DebugError::NotSupported(_)));
}

#[test]
fn invalidate_for_script_reports_dropped_records() {
    let fx = Fixture::new();
    let sink = Arc::new(RecordingSink::default());
    let bp = fx.debugger.breakpoints();
    bp.set_sink(Some(sink.clone()));
    bp.set_source_breakpoints(&main_source(), &lines(&[10, 42]))
        .unwrap();

    let reference = script_reference(MAIN_QUALIFIED);
    bp.invalidate_for_script(reference);

    let changed: Vec<_> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::BreakpointChanged(body) => Some(body),
            _ => None,
        })
        .collect();
    assert_eq!(changed.len(), 2);
    assert!(changed.iter().all(|body| !body.breakpoint.verified));
    assert_eq!(bp.source_breakpoint_count(reference), 0);

    // Absent script: no-op, no events.
    sink.clear();
    bp.invalidate_for_script(reference);
    assert!(sink.events().is_empty());
}

#[test]
fn clear_all_emits_only_when_asked() {
    let fx = Fixture::new();
    let sink = Arc::new(RecordingSink::default());
    let bp = fx.debugger.breakpoints();
    bp.set_sink(Some(sink.clone()));

    bp.set_source_breakpoints(&main_source(), &lines(&[10]))
        .unwrap();
    bp.clear_all(false);
    assert!(sink.events().is_empty());

    bp.set_source_breakpoints(&main_source(), &lines(&[10]))
        .unwrap();
    bp.clear_all(true);
    assert_eq!(sink.events().len(), 1);
}
