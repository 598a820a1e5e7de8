//! Execution controller tests
//!
//! Drives a synthetic VM thread through the instruction hook while the test
//! thread plays the DAP side, mirroring the real two-thread rendezvous.

use super::*;
use std::thread;
use zephyr_dap::protocol::{Source, SourceBreakpoint};
use zephyr_dap::{DebuggerState, StepType};

fn main_source() -> Source {
    Source {
        path: Some(MAIN_SCRIPT.to_string()),
        origin: Some("game.zpk".to_string()),
        ..Source::default()
    }
}

fn set_line_breakpoints(fx: &Fixture, requested: &[i64]) {
    let breakpoints: Vec<SourceBreakpoint> = requested
        .iter()
        .map(|&line| SourceBreakpoint {
            line,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: None,
        })
        .collect();
    fx.debugger
        .breakpoints()
        .set_source_breakpoints(&main_source(), &breakpoints)
        .unwrap();
}

/// Run the hook over a sequence of stack snapshots on a separate thread,
/// publishing each to the registry first, exactly like a host VM loop.
fn spawn_vm(fx: &Fixture, states: Vec<Arc<FrameStack>>) -> thread::JoinHandle<()> {
    let debugger = fx.debugger.clone();
    let stacks = fx.stacks.clone();
    thread::spawn(move || {
        for stack in states {
            stacks.publish(stack.clone());
            debugger.handle_instruction(&stack);
        }
        stacks.retire();
    })
}

fn open_with_sink(fx: &Fixture) -> Arc<RecordingSink> {
    let sink = Arc::new(RecordingSink::default());
    fx.debugger.execution().open(sink.clone());
    sink
}

#[test]
fn breakpoint_hit_pauses_vm_until_continue() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    set_line_breakpoints(&fx, &[42]);

    let states: Vec<_> = (0..=9)
        .map(|instruction| stack_of(vec![frame_at(1, &fx.update_fn, instruction)]))
        .collect();
    let vm = spawn_vm(&fx, states);

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    assert_eq!(fx.debugger.execution().state(), DebuggerState::Paused);
    // The paused stack is published for the DAP thread.
    assert!(fx.debugger.runtime().global_stack().is_some());

    fx.debugger.execution().resume();
    vm.join().unwrap();

    // One stop for the whole five-instruction line, one continued event.
    assert_eq!(sink.stopped_reasons(), vec!["breakpoint"]);
    assert_eq!(sink.continued_count(), 1);
    assert_eq!(fx.debugger.execution().state(), DebuggerState::Running);
    // The tree of the paused instant was discarded on resume.
    assert!(fx.debugger.runtime().global_stack().is_none());
}

#[test]
fn revisiting_the_line_stops_again() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    set_line_breakpoints(&fx, &[42]);

    // Two visits to line 42 with an excursion to line 43 in between.
    let states: Vec<_> = [2u32, 3, 7, 2, 3]
        .iter()
        .map(|&instruction| stack_of(vec![frame_at(1, &fx.update_fn, instruction)]))
        .collect();
    let vm = spawn_vm(&fx, states);

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    fx.debugger.execution().resume();
    wait_until(|| sink.stopped_reasons() == vec!["breakpoint", "breakpoint"]);
    fx.debugger.execution().resume();
    vm.join().unwrap();

    assert_eq!(sink.stopped_reasons(), vec!["breakpoint", "breakpoint"]);
}

#[test]
fn pause_request_stops_at_next_hook_entry() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);

    assert!(fx.debugger.execution().pause());
    let vm = spawn_vm(
        &fx,
        vec![stack_of(vec![frame_at(1, &fx.tick_fn, 0)])],
    );

    wait_until(|| sink.stopped_reasons() == vec!["paused"]);
    // Pausing while already paused is refused.
    assert!(!fx.debugger.execution().pause());
    fx.debugger.execution().resume();
    vm.join().unwrap();
}

#[test]
fn step_over_skips_the_called_function() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    // Break on the call line of Level.Tick.
    set_line_breakpoints(&fx, &[11]);

    let tick = |instruction| frame_at(1, &fx.tick_fn, instruction);
    let states = vec![
        stack_of(vec![tick(0)]),                                  // line 10
        stack_of(vec![tick(1)]),                                  // line 11: breakpoint
        stack_of(vec![tick(1), frame_at(2, &fx.update_fn, 0)]),   // inside Update
        stack_of(vec![tick(1), frame_at(2, &fx.update_fn, 7)]),   // still inside
        stack_of(vec![tick(2)]),                                  // back: line 12
        stack_of(vec![tick(4)]),                                  // line 13
    ];
    let vm = spawn_vm(&fx, states);

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    assert!(fx
        .debugger
        .execution()
        .step(1, StepType::StepOver));

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint", "step"]);
    // The step stop reports the caller's next line, never a line in Update.
    let stack = fx.debugger.runtime().global_stack().unwrap();
    let frame = stack.top_frame().unwrap();
    assert_eq!(frame.func.pc_to_line(frame.pc), Some(12));

    fx.debugger.execution().resume();
    vm.join().unwrap();
}

#[test]
fn step_out_returns_to_the_caller() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    // Break inside Level.Update while Level.Tick is the caller.
    set_line_breakpoints(&fx, &[42]);

    let tick = |instruction| frame_at(1, &fx.tick_fn, instruction);
    let states = vec![
        stack_of(vec![tick(1), frame_at(2, &fx.update_fn, 2)]), // breakpoint
        stack_of(vec![tick(1), frame_at(2, &fx.update_fn, 7)]),
        stack_of(vec![tick(2)]), // Update returned: line 12
    ];
    let vm = spawn_vm(&fx, states);

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    assert!(fx.debugger.execution().step(1, StepType::StepOut));

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint", "step"]);
    let stack = fx.debugger.runtime().global_stack().unwrap();
    assert_eq!(stack.frames.len(), 1);
    let frame = stack.top_frame().unwrap();
    assert_eq!(frame.func.pc_to_line(frame.pc), Some(12));

    fx.debugger.execution().resume();
    vm.join().unwrap();
}

#[test]
fn step_in_stops_at_the_very_next_instruction() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    set_line_breakpoints(&fx, &[11]);

    let tick = |instruction| frame_at(1, &fx.tick_fn, instruction);
    let states = vec![
        stack_of(vec![tick(1)]), // breakpoint on the call line
        stack_of(vec![tick(1), frame_at(2, &fx.update_fn, 0)]),
        stack_of(vec![tick(2)]),
    ];
    let vm = spawn_vm(&fx, states);

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    assert!(fx.debugger.execution().step(1, StepType::StepIn));

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint", "step"]);
    // Step-in descended into the callee.
    let stack = fx.debugger.runtime().global_stack().unwrap();
    assert_eq!(
        stack.top_frame().unwrap().func.qualified_name,
        "Level.Update"
    );

    fx.debugger.execution().resume();
    vm.join().unwrap();
}

#[test]
fn breakpoint_wins_over_step_condition() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    set_line_breakpoints(&fx, &[10, 12]);

    let tick = |instruction| frame_at(1, &fx.tick_fn, instruction);
    let states = vec![
        stack_of(vec![tick(0)]), // breakpoint at line 10
        stack_of(vec![tick(2)]), // line 12: both step target and breakpoint
    ];
    let vm = spawn_vm(&fx, states);

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    assert!(fx.debugger.execution().step(1, StepType::StepOver));

    wait_until(|| sink.stopped_reasons().len() == 2);
    assert_eq!(sink.stopped_reasons(), vec!["breakpoint", "breakpoint"]);

    fx.debugger.execution().resume();
    vm.join().unwrap();
}

#[test]
fn vanished_step_stack_falls_back_to_running() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    set_line_breakpoints(&fx, &[10]);

    let debugger = fx.debugger.clone();
    let stacks = fx.stacks.clone();
    let first = stack_of(vec![frame_at(1, &fx.tick_fn, 0)]);
    let replacement = Arc::new(FrameStack {
        id: 2,
        frames: vec![frame_at(9, &fx.update_fn, 0)],
    });
    let vm = thread::spawn(move || {
        stacks.publish(first.clone());
        debugger.handle_instruction(&first);
        // The original stack unwinds and a different one appears.
        stacks.retire();
        stacks.publish(replacement.clone());
        debugger.handle_instruction(&replacement);
        stacks.retire();
    });

    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);
    assert!(fx.debugger.execution().step(1, StepType::StepOver));
    vm.join().unwrap();

    assert_eq!(sink.stopped_reasons(), vec!["breakpoint"]);
    assert_eq!(sink.continued_count(), 1);
    assert_eq!(fx.debugger.execution().state(), DebuggerState::Running);
}

#[test]
fn step_requires_the_paused_state() {
    let fx = Fixture::new();
    open_with_sink(&fx);
    fx.stacks
        .publish(stack_of(vec![frame_at(1, &fx.tick_fn, 0)]));
    assert!(!fx.debugger.execution().step(1, StepType::StepIn));
}

#[test]
fn close_releases_a_paused_vm_thread() {
    let fx = Fixture::new();
    let sink = open_with_sink(&fx);
    set_line_breakpoints(&fx, &[42]);

    let vm = spawn_vm(
        &fx,
        vec![stack_of(vec![frame_at(1, &fx.update_fn, 2)])],
    );
    wait_until(|| sink.stopped_reasons() == vec!["breakpoint"]);

    fx.debugger.execution().close();
    vm.join().unwrap();

    // Closed controller ignores further hook entries.
    fx.debugger
        .handle_instruction(&stack_of(vec![frame_at(1, &fx.update_fn, 2)]));
    assert_eq!(sink.stopped_reasons(), vec!["breakpoint"]);
}
