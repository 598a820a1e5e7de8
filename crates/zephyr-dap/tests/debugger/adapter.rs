//! Request surface tests
//!
//! Drives the adapter through full DAP request envelopes against a capturing
//! session, asserting on the framed responses and events.

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use zephyr_dap::refs::{breakpoint_id, script_reference};

fn attach_session(fx: &Fixture) -> SharedBuf {
    let (session, buf) = capture_session();
    fx.debugger.start_session(session);
    buf
}

fn paused_in_shoot(fx: &Fixture, self_addr: u64) {
    let mut shoot = frame_at(2, &fx.shoot_fn, 0);
    shoot.addr_regs = vec![self_addr];
    let stack = stack_of(vec![frame_at(1, &fx.tick_fn, 1), shoot]);
    fx.debugger.runtime().set_global_stack(stack);
}

#[test]
fn initialize_reports_capabilities_then_initialized_event() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger
        .handle_request(&request(1, "initialize", json!({"adapterID": "zephyr"})));

    let response = response_for(&buf, 1).unwrap();
    assert_eq!(response["success"], true);
    let body = &response["body"];
    assert_eq!(body["supportsConfigurationDoneRequest"], true);
    assert_eq!(body["supportsLoadedSourcesRequest"], true);
    assert_eq!(body["supportsFunctionBreakpoints"], true);
    assert_eq!(body["supportedChecksumAlgorithms"], json!(["CRC32"]));

    // The initialized event follows the response.
    let messages = drain_messages(&buf);
    let response_at = messages
        .iter()
        .position(|m| m["type"] == "response")
        .unwrap();
    let event_at = messages
        .iter()
        .position(|m| m["event"] == "initialized")
        .unwrap();
    assert!(event_at > response_at);
}

#[test]
fn set_breakpoints_round_trip() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        2,
        "setBreakpoints",
        json!({
            "source": {"path": MAIN_SCRIPT, "origin": "game.zpk"},
            "breakpoints": [{"line": 42}],
        }),
    ));

    let response = response_for(&buf, 2).unwrap();
    assert_eq!(response["success"], true);
    let breakpoints = response["body"]["breakpoints"].as_array().unwrap();
    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0]["verified"], true);
    assert_eq!(breakpoints[0]["line"], 42);
    let reference = script_reference(MAIN_QUALIFIED);
    assert_eq!(
        breakpoints[0]["id"].as_i64().unwrap(),
        breakpoint_id(reference, 42)
    );
    // The echoed source points the client back at us for content.
    assert_eq!(
        breakpoints[0]["source"]["sourceReference"].as_i64().unwrap(),
        i64::from(reference.0)
    );
}

#[test]
fn set_breakpoints_on_unknown_script_fails() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        3,
        "setBreakpoints",
        json!({
            "source": {"path": "scripts/ghost.zs"},
            "breakpoints": [{"line": 1}],
        }),
    ));

    let response = response_for(&buf, 3).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("not loaded"));
}

#[test]
fn project_sources_are_preferred_when_set() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        4,
        "attach",
        json!({
            "projectPath": "/work/game",
            "projectArchive": "game.zpk",
            "projectSources": [
                {"name": "main.zs", "path": MAIN_SCRIPT, "origin": "game.zpk"},
            ],
        }),
    ));
    assert_eq!(response_for(&buf, 4).unwrap()["success"], true);

    fx.debugger.handle_request(&request(
        5,
        "setBreakpoints",
        json!({
            "source": {"path": MAIN_SCRIPT, "origin": "game.zpk"},
            "breakpoints": [{"line": 10}],
        }),
    ));
    let response = response_for(&buf, 5).unwrap();
    // Project-supplied sources keep serving from the client's tree: no
    // sourceReference is forced onto them.
    assert!(response["body"]["breakpoints"][0]["source"]["sourceReference"].is_null());

    fx.debugger.handle_request(&request(6, "loadedSources", json!({})));
    let response = response_for(&buf, 6).unwrap();
    let sources = response["body"]["sources"].as_array().unwrap();
    let main = sources
        .iter()
        .find(|s| s["path"] == MAIN_SCRIPT)
        .unwrap();
    assert!(main["sourceReference"].is_null());
    assert!(main["checksums"].is_null());
}

#[test]
fn launch_carries_the_same_project_fields() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        7,
        "launch",
        json!({
            "noDebug": false,
            "projectPath": "/work/game",
            "projectArchive": "game.zpk",
        }),
    ));
    assert_eq!(response_for(&buf, 7).unwrap()["success"], true);
}

#[test]
fn threads_lists_the_single_vm_thread() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(8, "threads", json!({})));
    let response = response_for(&buf, 8).unwrap();
    assert_eq!(
        response["body"]["threads"],
        json!([{"id": 1, "name": "Main Thread"}])
    );
}

#[test]
fn stack_trace_scopes_variables_walk() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);
    paused_in_shoot(&fx, fx.spawn_actor(0x2000, 100));

    fx.debugger
        .handle_request(&request(9, "stackTrace", json!({"threadId": 1})));
    let response = response_for(&buf, 9).unwrap();
    assert_eq!(response["body"]["totalFrames"], 2);
    let frames = response["body"]["stackFrames"].as_array().unwrap();
    assert_eq!(frames[0]["name"], "Actor.Shoot");
    assert_eq!(frames[0]["line"], 20);
    assert_eq!(frames[1]["name"], "Level.Tick");

    let frame_id = frames[0]["id"].as_i64().unwrap();
    fx.debugger
        .handle_request(&request(10, "scopes", json!({"frameId": frame_id})));
    let response = response_for(&buf, 10).unwrap();
    let scopes = response["body"]["scopes"].as_array().unwrap();
    assert_eq!(scopes[0]["name"], "Local");
    assert_eq!(scopes[1]["name"], "Registers");

    let local_ref = scopes[0]["variablesReference"].as_i64().unwrap();
    fx.debugger.handle_request(&request(
        11,
        "variables",
        json!({"variablesReference": local_ref}),
    ));
    let response = response_for(&buf, 11).unwrap();
    let variables = response["body"]["variables"].as_array().unwrap();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0]["name"], "self");
    assert_eq!(variables[0]["type"], "Pointer(Actor)");
    assert_eq!(variables[0]["value"], "0x00002000 {Actor}");

    // Expanding self yields the actor's fields.
    let self_ref = variables[0]["variablesReference"].as_i64().unwrap();
    assert!(self_ref > 0);
    fx.debugger.handle_request(&request(
        12,
        "variables",
        json!({"variablesReference": self_ref}),
    ));
    let response = response_for(&buf, 12).unwrap();
    let fields = response["body"]["variables"].as_array().unwrap();
    assert_eq!(fields[0]["name"], "health");
    assert_eq!(fields[0]["value"], "100");
}

#[test]
fn stack_trace_honors_start_frame_and_levels() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);
    paused_in_shoot(&fx, fx.spawn_actor(0x2000, 100));

    fx.debugger.handle_request(&request(
        13,
        "stackTrace",
        json!({"threadId": 1, "startFrame": 1, "levels": 1}),
    ));
    let response = response_for(&buf, 13).unwrap();
    let frames = response["body"]["stackFrames"].as_array().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["name"], "Level.Tick");
    assert_eq!(response["body"]["totalFrames"], 2);
}

#[test]
fn variables_honors_the_count_argument() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);
    paused_in_shoot(&fx, fx.spawn_actor(0x2000, 100));

    fx.debugger
        .handle_request(&request(14, "stackTrace", json!({"threadId": 1})));
    let frames = response_for(&buf, 14).unwrap()["body"]["stackFrames"].clone();
    let frame_id = frames[0]["id"].as_i64().unwrap();
    fx.debugger
        .handle_request(&request(15, "scopes", json!({"frameId": frame_id})));
    let scopes = response_for(&buf, 15).unwrap()["body"]["scopes"].clone();
    let local_ref = scopes[0]["variablesReference"].as_i64().unwrap();

    fx.debugger.handle_request(&request(
        16,
        "variables",
        json!({"variablesReference": local_ref}),
    ));
    let self_ref = response_for(&buf, 16).unwrap()["body"]["variables"][0]
        ["variablesReference"]
        .as_i64()
        .unwrap();

    fx.debugger.handle_request(&request(
        17,
        "variables",
        json!({"variablesReference": self_ref, "count": 2}),
    ));
    let fields = response_for(&buf, 17).unwrap()["body"]["variables"].clone();
    assert_eq!(fields.as_array().unwrap().len(), 2);
}

#[test]
fn stack_trace_without_a_paused_vm_is_an_error() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger
        .handle_request(&request(18, "stackTrace", json!({"threadId": 1})));
    let response = response_for(&buf, 18).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("invalid handle"));
}

#[test]
fn source_request_serves_script_content() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);
    let reference = fx
        .debugger
        .cache()
        .get_script(MAIN_QUALIFIED)
        .unwrap()
        .script_ref;

    fx.debugger.handle_request(&request(
        19,
        "source",
        json!({"source": {"sourceReference": reference.0}, "sourceReference": reference.0}),
    ));
    let response = response_for(&buf, 19).unwrap();
    assert_eq!(response["success"], true);
    assert_eq!(response["body"]["content"], MAIN_SOURCE);
}

#[test]
fn instruction_breakpoints_answer_not_supported() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        20,
        "setInstructionBreakpoints",
        json!({"breakpoints": []}),
    ));
    let response = response_for(&buf, 20).unwrap();
    assert_eq!(response["success"], false);
    assert!(response["message"]
        .as_str()
        .unwrap()
        .contains("not supported"));
}

#[test]
fn unknown_commands_are_rejected() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger
        .handle_request(&request(21, "readMemory", json!({})));
    let response = response_for(&buf, 21).unwrap();
    assert_eq!(response["success"], false);
}

#[test]
fn set_function_breakpoints_round_trip() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        22,
        "setFunctionBreakpoints",
        json!({"breakpoints": [{"name": "Actor.Die"}, {"name": "bogus"}]}),
    ));
    let response = response_for(&buf, 22).unwrap();
    assert_eq!(response["success"], true);
    let breakpoints = response["body"]["breakpoints"].as_array().unwrap();
    assert_eq!(breakpoints[0]["verified"], true);
    assert_eq!(breakpoints[0]["line"], 1);
    assert_eq!(breakpoints[1]["verified"], false);
}

#[test]
fn end_session_clears_breakpoints_and_project_state() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.handle_request(&request(
        23,
        "setBreakpoints",
        json!({
            "source": {"path": MAIN_SCRIPT, "origin": "game.zpk"},
            "breakpoints": [{"line": 42}],
        }),
    ));
    assert_eq!(response_for(&buf, 23).unwrap()["success"], true);

    fx.debugger.end_session();
    let reference = script_reference(MAIN_QUALIFIED);
    assert_eq!(
        fx.debugger.breakpoints().source_breakpoint_count(reference),
        0
    );
    // Hook entries after teardown are ignored.
    fx.debugger
        .handle_instruction(&stack_of(vec![frame_at(1, &fx.update_fn, 2)]));
    assert!(events_named(&buf, "stopped").is_empty());
}

#[test]
fn log_output_is_forwarded_to_the_console() {
    let fx = Fixture::new();
    let buf = attach_session(&fx);

    fx.debugger.log_output("script warning: thing");
    let outputs = events_named(&buf, "output");
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0]["body"]["category"], "console");
    assert_eq!(outputs[0]["body"]["output"], "script warning: thing\r\n");
}
