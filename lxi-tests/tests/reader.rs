use std::time::{Duration, Instant};

use lxi_client::Instrument;
use lxi_protocol::{Decoded, decode::INT_SENTINEL};
use lxi_server::Response;
use lxi_tests::{ScriptedInstrument, spawn};

const PSU_IDN: &str = "KEYSIGHT,E36312A,MY00000001,2.1.0";

async fn connected(scripted: ScriptedInstrument) -> Instrument {
    let addr = spawn(scripted).await;
    let mut instrument = Instrument::default();
    assert!(instrument.connect(addr).await);
    instrument
}

#[tokio::test]
async fn silence_yields_empty_reply_after_first_byte_budget() {
    let mut instrument = connected(ScriptedInstrument::identifying(PSU_IDN)).await;

    let start = Instant::now();
    let reply = instrument.query("MEAS:VOLT?").await.unwrap();
    let elapsed = start.elapsed();

    assert!(reply.is_empty());
    assert!(elapsed >= Duration::from_millis(400), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(750), "took {elapsed:?}");
    assert_eq!(reply.float(), Decoded::Empty);
    assert!(instrument.is_connected());
}

#[tokio::test]
async fn silence_decodes_to_sentinels() {
    let mut instrument = connected(ScriptedInstrument::identifying(PSU_IDN)).await;

    assert_eq!(instrument.query_text("MEAS:VOLT?").await.unwrap(), "");
    assert!(!instrument.query_bool("OUTP?").await.unwrap());
    assert_eq!(instrument.query_int("*STB?").await.unwrap(), INT_SENTINEL);
    assert!(instrument.query_float("MEAS:CURR?").await.unwrap().is_nan());
}

#[tokio::test]
async fn reply_split_across_budget_phases_is_joined() {
    let scripted = ScriptedInstrument::identifying(PSU_IDN)
        .on_segments("MEAS:VOLT?", &[(0, "4"), (500, "2.5\n")]);
    let mut instrument = connected(scripted).await;

    let start = Instant::now();
    assert_eq!(instrument.query_float("MEAS:VOLT?").await.unwrap(), 42.5);
    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test]
async fn trickle_past_continuation_budget_keeps_partial_reply() {
    let scripted = ScriptedInstrument::identifying(PSU_IDN)
        .on_segments("MEAS:VOLT?", &[(0, "12"), (900, "34\n")])
        .on("VOLT?", Response::line("1.5"));
    let mut instrument = connected(scripted).await;

    let start = Instant::now();
    assert_eq!(instrument.query_text("MEAS:VOLT?").await.unwrap(), "12");
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(750), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "took {elapsed:?}");

    // The late tail is discarded before the next exchange
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(instrument.query_float("VOLT?").await.unwrap(), 1.5);
}

#[tokio::test]
async fn error_reply_decodes_to_sentinels() {
    let scripted = ScriptedInstrument::identifying(PSU_IDN).on("MEAS:CURR?", Response::line("ERR"));
    let mut instrument = connected(scripted).await;

    assert!(instrument.query_float("MEAS:CURR?").await.unwrap().is_nan());
    assert_eq!(instrument.query_int("MEAS:CURR?").await.unwrap(), INT_SENTINEL);
    assert!(!instrument.query_bool("MEAS:CURR?").await.unwrap());
    assert!(matches!(
        instrument.query("MEAS:CURR?").await.unwrap().float(),
        Decoded::Malformed(_)
    ));
}

#[tokio::test]
async fn stale_reply_is_not_taken_for_the_next_one() {
    let scripted = ScriptedInstrument::identifying(PSU_IDN)
        .on("SYST:BEEP", Response::line("unsolicited"))
        .on("VOLT?", Response::line("3.300"));
    let mut instrument = connected(scripted).await;

    instrument.send("SYST:BEEP").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(instrument.query_float("VOLT?").await.unwrap(), 3.3);
    assert_eq!(instrument.clear_buffer().unwrap(), 0);
}

#[tokio::test]
async fn custom_terminator() {
    let scripted = ScriptedInstrument::identifying(PSU_IDN)
        .on("FA;", Response::raw(&b"FA00014074000;"[..]));
    let mut instrument = connected(scripted).await;

    instrument.send("FA;").await.unwrap();
    let reply = instrument.read_framed_reply(b';').await.unwrap();
    assert_eq!(reply, b"FA00014074000;");
}

#[tokio::test]
async fn common_commands() {
    let (addr, scripted) = lxi_tests::spawn_shared(
        ScriptedInstrument::identifying(PSU_IDN)
            .on("*OPC?", Response::line("1"))
            .on("*STB?", Response::line("0"))
            .on("*ESR?", Response::line("32"))
            .on("*TST?", Response::line("0")),
    )
    .await;
    let mut instrument = Instrument::default();
    assert!(instrument.connect(addr).await);

    instrument.reset().await.unwrap();
    instrument.clear_status().await.unwrap();
    instrument.trigger().await.unwrap();
    assert!(instrument.operation_complete().await.unwrap());
    assert_eq!(instrument.status_byte().await.unwrap(), 0);
    assert_eq!(instrument.event_status().await.unwrap(), 32);
    assert_eq!(instrument.self_test().await.unwrap(), 0);

    assert_eq!(
        scripted.received(),
        vec!["*IDN?", "*RST", "*CLS", "*TRG", "*OPC?", "*STB?", "*ESR?", "*TST?"]
    );
}
