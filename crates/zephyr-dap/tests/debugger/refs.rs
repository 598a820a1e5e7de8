//! Script reference and breakpoint id properties

use proptest::prelude::*;
use rstest::rstest;
use zephyr_dap::refs::{breakpoint_id, is_script_path, script_reference, ScriptRef};

#[rstest]
#[case("scripts/main.zs", true)]
#[case("scripts/AI.ZSC", true)]
#[case("scripts/util.zc", true)]
#[case("maps/level.acs", true)]
#[case("behaviors/monsters.dec", true)]
#[case("game.zpk:DECORATE", true)]
#[case("mod.zpk:acs", true)]
#[case("textures/wall.png", false)]
#[case("README", false)]
#[case("scripts/main.zs.bak", false)]
fn script_file_detection(#[case] path: &str, #[case] expected: bool) {
    assert_eq!(is_script_path(path), expected);
}

#[test]
fn reference_is_stable_across_calls() {
    let a = script_reference("game.zpk:scripts/main.zs");
    let b = script_reference("game.zpk:scripts/main.zs");
    assert_eq!(a, b);
}

#[test]
fn breakpoint_id_halves_decompose() {
    let id = breakpoint_id(ScriptRef(0x1234), 99);
    assert_eq!(id >> 32, 0x1234);
    assert_eq!(id & 0xffff_ffff, 99);
}

proptest! {
    /// Case variants of the same qualified path always agree, and every
    /// non-empty path gets a positive reference.
    #[test]
    fn references_ignore_case(path in "[ -~]{1,48}") {
        let lower = script_reference(&path.to_ascii_lowercase());
        let upper = script_reference(&path.to_ascii_uppercase());
        prop_assert_eq!(lower, upper);
        prop_assert!(lower.is_valid());
    }

    /// Repeated derivation of breakpoint ids is stable.
    #[test]
    fn breakpoint_ids_are_stable(reference in 1i32..i32::MAX, line in 0u32..100_000) {
        let reference = ScriptRef(reference);
        prop_assert_eq!(
            breakpoint_id(reference, line),
            breakpoint_id(reference, line)
        );
    }

    /// Distinct (ref, line) pairs get distinct ids.
    #[test]
    fn breakpoint_ids_do_not_collide(
        ref_a in 1i32..1000, line_a in 0u32..1000,
        ref_b in 1i32..1000, line_b in 0u32..1000,
    ) {
        prop_assume!((ref_a, line_a) != (ref_b, line_b));
        prop_assert_ne!(
            breakpoint_id(ScriptRef(ref_a), line_a),
            breakpoint_id(ScriptRef(ref_b), line_b)
        );
    }
}
