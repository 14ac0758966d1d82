//! Unit tests for the hook protocol.

use std::io::Cursor;

use casl_config::{Phase, WorkspaceConfig};
use rstest::rstest;

use super::*;
use crate::hook::FnHook;

fn request_line(phase: Phase) -> String {
    let context = PhaseContext::builder(phase, "/work")
        .artifact_root("/work/dist")
        .artifacts(["/work/dist/app"])
        .build();
    HookRequest::for_context(&context, "signer")
        .to_line()
        .expect("request encodes")
}

#[test]
fn requests_carry_the_context_and_are_noninteractive() {
    let line = request_line(Phase::Post);
    assert!(line.ends_with('\n'));
    let request: HookRequest = serde_json::from_str(line.trim()).expect("request decodes");
    assert_eq!(request.phase, Phase::Post);
    assert_eq!(request.plugin_id, "signer");
    assert_eq!(request.artifacts, vec![PathBuf::from("/work/dist/app")]);
    assert_eq!(request.write_root, Some(PathBuf::from("/work")));
    assert!(request.noninteractive);
}

#[test]
fn minimal_requests_use_defaults() {
    let request: HookRequest =
        serde_json::from_str(r#"{"phase":"pre","plugin_id":"fmt","workspace_root":"/w"}"#)
            .expect("request decodes");
    assert!(request.noninteractive);
    assert_eq!(request.config, WorkspaceConfig::default());
    let context = request.into_context();
    assert!(context.is_noninteractive());
    assert_eq!(context.write_root(), std::path::Path::new("/w"));
}

#[rstest]
#[case("{\"status\":\"success\"}\n", HookResponse::Success)]
#[case(
    "checking...\n{\"status\":\"failure\",\"error\":\"bad header\"}\n\n",
    HookResponse::Failure { error: "bad header".to_owned() }
)]
fn responses_come_from_the_last_non_empty_line(
    #[case] stdout: &str,
    #[case] expected: HookResponse,
) {
    assert_eq!(parse_response("fmt", stdout).expect("valid response"), expected);
}

#[rstest]
#[case("")]
#[case("\n  \n")]
#[case("{\"status\":\"success\"}\nall done\n")]
fn missing_or_trailing_noise_is_rejected(#[case] stdout: &str) {
    let error = parse_response("fmt", stdout).expect_err("response must be rejected");
    assert!(matches!(error, PluginError::InvalidResponse { ref id, .. } if id == "fmt"));
}

#[test]
fn serve_hook_round_trips_a_failure() {
    let hook = FnHook::new(|ctx: &PhaseContext| {
        Err(HookError::new(format!("no artifacts in {}", ctx.phase().label())))
    });
    let mut output = Vec::new();
    let response = serve_hook_with(Cursor::new(request_line(Phase::Post)), &mut output, &hook)
        .expect("serve succeeds");

    assert_eq!(response.error(), Some("no artifacts in post-build"));
    let written = String::from_utf8(output).expect("utf-8 output");
    assert_eq!(parse_response("signer", &written).expect("valid line"), response);
}

#[test]
fn serve_hook_reports_panics_as_failures() {
    let hook = FnHook::new(|_: &PhaseContext| -> Result<(), HookError> { panic!("boom") });
    let mut output = Vec::new();
    let response = serve_hook_with(Cursor::new(request_line(Phase::Pre)), &mut output, &hook)
        .expect("serve succeeds");
    assert_eq!(response.error(), Some("plugin panicked: boom"));
}

#[test]
fn serve_hook_rejects_garbage_requests() {
    let hook = FnHook::new(|_: &PhaseContext| Ok::<(), HookError>(()));
    let error = serve_hook_with(Cursor::new("not json\n"), Vec::<u8>::new(), &hook)
        .expect_err("request must be rejected");
    assert!(matches!(error, PluginError::InvalidRequest { .. }));
}
