use ptz_core::error::BuildError;
use ptz_core::mocks::NullLink;
use ptz_core::{Console, ConsoleCfg, SyncCfg, build_console};
use rstest::rstest;

#[rstest]
fn builder_missing_link_yields_typed_build_error() {
    let err = Console::builder()
        .try_build()
        .expect_err("should fail with MissingLink");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingLink) => {}
        other => panic!("expected MissingLink, got {other:?}"),
    }
}

#[rstest]
#[case(ConsoleCfg { sync: SyncCfg { samples: 0, ..SyncCfg::default() }, ..ConsoleCfg::default() }, "samples")]
#[case(ConsoleCfg { sync: SyncCfg { ping_gap_ms: 0, ..SyncCfg::default() }, ..ConsoleCfg::default() }, "ping gap")]
fn invalid_config_names_the_offending_field(#[case] cfg: ConsoleCfg, #[case] needle: &str) {
    let err = build_console(NullLink, cfg, None).expect_err("invalid config must not build");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}")
        }
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}
