//! Session, queue and keepalive behaviour against a mock gateway.

mod common;

use std::time::Duration;

use anyhow::Result;
use lcn_pck::protocol::StatusScope;
use lcn_pck::transport::Connection;
use lcn_pck::{Address, CommandKind, ConnectionState, Error, Event, Lcn, RecordType, Request};
use tokio::time::timeout;

use common::{MockGateway, WAIT, options, wait_for};

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_reaches_ready() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();

    let _session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    assert!(lcn.is_connected());
    assert_eq!(lcn.state(), ConnectionState::Ready);

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_legacy_data_counts_as_connected() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();

    let mut session = gateway.accept().await?;
    session.login().await?;
    session.send(":M000005A1050").await?;
    session.answer_setup().await?;

    wait_for(&mut events, |event| *event == Event::Connected).await?;
    let event = wait_for(&mut events, |event| matches!(event, Event::Update(_))).await?;
    let Event::Update(record) = event else {
        unreachable!()
    };
    assert_eq!(record.module, 5);
    assert_eq!(record.record_type, RecordType::Analog);

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_license_error_reconnects() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();

    let mut session = gateway.accept().await?;
    session.login().await?;
    session.send("$err:(license?)").await?;

    let event = wait_for(&mut events, |event| matches!(event, Event::Error(_))).await?;
    assert_eq!(event, Event::Error("License error received".to_string()));
    session.closed().await?;

    let _session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_wrong_prompt_is_fatal() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();

    let mut session = gateway.accept().await?;
    session.send("Login:").await?;

    let event = wait_for(&mut events, |event| matches!(event, Event::Error(_))).await?;
    let Event::Error(message) = event else {
        unreachable!()
    };
    assert!(message.contains("WAIT_USER"), "{message}");
    session.closed().await?;

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_unexpected_line_before_bus_attach_is_fatal() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();

    let mut session = gateway.accept().await?;
    session.login().await?;
    session.send("garbage-line").await?;

    let event = wait_for(&mut events, |event| matches!(event, Event::Error(_))).await?;
    let Event::Error(message) = event else {
        unreachable!()
    };
    assert!(message.contains("WAIT_CONNECTED"), "{message}");
    assert!(message.contains("garbage-line"), "{message}");
    timeout(Duration::from_secs(1), session.closed()).await??;

    let _session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_connection_reports_connected_after_setup() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let connection = Connection::spawn(options(gateway.port()).connection_config());
    connection.connect();

    let mut session = gateway.accept().await?;
    session.login().await?;
    session.send("$io:#LCN:connected").await?;

    session.expect("!OM0P").await?;
    assert_eq!(connection.state(), ConnectionState::WaitResponse);
    assert!(!connection.is_connected());
    session.send("(0..50-mode percent)").await?;

    session.expect("!CHD").await?;
    assert!(!connection.is_connected());
    session.send("(dec-mode)").await?;

    timeout(WAIT, async {
        while !connection.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    connection.shutdown().await;
    assert!(!connection.is_connected());
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_commands_are_sent_one_at_a_time() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    let first = lcn.control(0, 5, CommandKind::RelayOut, 1u8, true);
    let second = lcn.control(0, 6, CommandKind::RelayOut, 2u8, false);
    let gateway_side = async {
        session.expect(">M000005!R81-------").await?;
        session.expect_silence(Duration::from_millis(200)).await?;
        session.send("-M000005!").await?;
        session.expect(">M000006!R8-0------").await?;
        session.send("-M000006!").await?;
        anyhow::Ok(())
    };

    let (first, second, gateway_side) = tokio::join!(first, second, gateway_side);
    gateway_side?;
    assert_eq!(first?[0].module, 5);
    assert_eq!(second?[0].module, 6);

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_negative_ack_is_reported() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    let control = lcn.control(0, 5, CommandKind::LedOut, 3u8, true);
    let gateway_side = async {
        session.expect(">M000005!LA003E").await?;
        session.send("-M000005009").await?;
        anyhow::Ok(())
    };

    let (result, gateway_side) = tokio::join!(control, gateway_side);
    gateway_side?;
    assert!(matches!(result, Err(Error::Nak { module: 5, .. })));

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_command_error_keeps_session() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    let address = Address::module(0, 5);
    let request = Request::GetStatus(StatusScope::Relay);

    let command = lcn.command(address, &request, None, false);
    let gateway_side = async {
        session.expect(">M000005.SMR").await?;
        session.send("(c-error)").await?;
        anyhow::Ok(())
    };
    let (result, gateway_side) = tokio::join!(command, gateway_side);
    gateway_side?;
    assert!(matches!(result, Err(Error::CommandRejected { .. })));

    let command = lcn.command(address, &request, None, false);
    let gateway_side = async {
        session.expect(">M000005.SMR").await?;
        session.send(":M000005Rx005").await?;
        anyhow::Ok(())
    };
    let (result, gateway_side) = tokio::join!(command, gateway_side);
    gateway_side?;
    assert_eq!(result?.as_deref(), Some(":M000005Rx005"));
    assert!(lcn.is_connected());

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_parameter_error_is_reported() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    let command = lcn.command(Address::module(0, 5), &Request::GetSerial, None, false);
    let gateway_side = async {
        session.expect(">M000005.SN").await?;
        session.send("(P1:p-error)").await?;
        anyhow::Ok(())
    };
    let (result, gateway_side) = tokio::join!(command, gateway_side);
    gateway_side?;
    match result {
        Err(Error::InvalidParameter { code, .. }) => assert_eq!(code, "P1"),
        other => panic!("unexpected {other:?}"),
    }

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_ignore_timeout_returns_none() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    let address = Address::module(0, 9);
    let short = Some(Duration::from_millis(100));

    let result = lcn.command(address, &Request::GetSerial, short, true).await?;
    assert_eq!(result, None);

    let result = lcn.command(address, &Request::GetSerial, short, false).await;
    assert!(matches!(result, Err(Error::CommandTimeout { timeout_ms: 100, .. })));

    session.expect(">M000009.SN").await?;
    session.expect(">M000009.SN").await?;
    assert!(lcn.is_connected());

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_unsolicited_lines_become_updates() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    session.send(":M000007Rx005").await?;
    session.send("garbage").await?;

    let event = wait_for(&mut events, |event| matches!(event, Event::Update(_))).await?;
    let Event::Update(record) = event else {
        unreachable!()
    };
    assert_eq!(record.module, 7);
    assert_eq!(record.record_type, RecordType::Relay);

    let event = wait_for(&mut events, |event| matches!(event, Event::Data(_))).await?;
    assert_eq!(event, Event::Data("garbage".to_string()));

    lcn.destroy().await;
    Ok(())
}

// ============================================================================
// Keepalive
// ============================================================================

#[tokio::test]
async fn test_ping_keeps_session() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder()
        .options(options(gateway.port()))
        .ping_interval(Duration::from_millis(400))
        .ping_timeout(Duration::from_millis(200))
        .build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    session.expect("^ping1").await?;
    session.send("^ping1-").await?;
    session.expect("^ping2").await?;
    session.send("^ping2-").await?;

    assert!(lcn.is_connected());

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_ping_mismatch_reconnects() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder()
        .options(options(gateway.port()))
        .ping_interval(Duration::from_millis(400))
        .ping_timeout(Duration::from_millis(200))
        .build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    session.expect("^ping1").await?;
    session.send("^ping7-").await?;

    wait_for(&mut events, |event| *event == Event::Disconnected).await?;
    assert!(!lcn.is_connected());
    session.closed().await?;

    let _session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    lcn.destroy().await;
    Ok(())
}

#[tokio::test]
async fn test_unanswered_ping_reconnects() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder()
        .options(options(gateway.port()))
        .ping_interval(Duration::from_millis(400))
        .ping_timeout(Duration::from_millis(200))
        .build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    session.expect("^ping1").await?;

    wait_for(&mut events, |event| *event == Event::Disconnected).await?;
    assert!(!lcn.is_connected());
    session.closed().await?;

    let _session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    lcn.destroy().await;
    Ok(())
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_destroy_rejects_pending_command() -> Result<()> {
    let gateway = MockGateway::bind().await?;
    let lcn = Lcn::builder().options(options(gateway.port())).build()?;
    let mut events = lcn.subscribe();
    let mut session = gateway.accept_ready().await?;
    wait_for(&mut events, |event| *event == Event::Connected).await?;

    let command = lcn.command(
        Address::module(0, 5),
        &Request::GetSerial,
        Some(Duration::from_secs(5)),
        false,
    );
    let shutdown = async {
        session.expect(">M000005.SN").await?;
        lcn.destroy().await;
        session.closed().await?;
        anyhow::Ok(())
    };

    let (result, shutdown) = tokio::join!(command, shutdown);
    shutdown?;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert!(!lcn.is_connected());
    assert_eq!(lcn.state(), ConnectionState::Disconnect);

    let result = lcn.control(0, 5, CommandKind::RelayOut, 1u8, true).await;
    assert!(matches!(result, Err(Error::NotConnected)));
    Ok(())
}
