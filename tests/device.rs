// MIT License - Copyright (c) 2026 Peter Wright
// Device task tests over scripted and simulated lines

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use paradox_ptr::constants::SIMULATOR_LINES;
use paradox_ptr::{
    spawn_device, spawn_device_with, ActionType, Command, CommandType, DeviceConfig, EventReceiver,
    DeviceRegistry, PanelError, PanelEvent, PolledValue, PtrType, Result, Subject, Transport,
    event_channel,
};

/// State shared between a scripted panel and the test driving it.
#[derive(Default)]
struct Line {
    input: Vec<u8>,
    replies: VecDeque<Option<&'static str>>,
    sent: Vec<String>,
    fail_reads: bool,
}

/// PTR3 panel that answers each write with the next scripted reply and
/// delivers whatever the test pushes into `input`.
struct ScriptedPanel {
    line: Arc<Mutex<Line>>,
    connected: bool,
}

impl ScriptedPanel {
    fn new(replies: &[Option<&'static str>]) -> (Self, Arc<Mutex<Line>>) {
        let line = Arc::new(Mutex::new(Line {
            replies: replies.iter().copied().collect(),
            ..Line::default()
        }));
        let panel = Self {
            line: line.clone(),
            connected: false,
        };
        (panel, line)
    }
}

#[async_trait]
impl Transport for ScriptedPanel {
    fn ptr_type(&self) -> PtrType {
        PtrType::Ptr3
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut line = self.line.lock().unwrap();
        line.sent.push(String::from_utf8_lossy(data).into_owned());
        if let Some(Some(reply)) = line.replies.pop_front() {
            line.input.extend_from_slice(reply.as_bytes());
        }
        Ok(())
    }

    async fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let mut line = self.line.lock().unwrap();
        if line.fail_reads {
            return Err(PanelError::Disconnected);
        }
        let n = line.input.len();
        buf.append(&mut line.input);
        Ok(n)
    }
}

fn config(ptr_type: PtrType) -> DeviceConfig {
    DeviceConfig::builder()
        .id("alarm")
        .ptr_type(ptr_type)
        .command_timeout_ms(1000)
        .simulator_delay_ms(5000)
        .build()
}

/// Wait for the first event matching `pred`, skipping the rest.
async fn wait_for(rx: &mut EventReceiver, pred: impl Fn(&PanelEvent) -> bool) -> PanelEvent {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn push_line(line: &Arc<Mutex<Line>>, text: &str) {
    let mut line = line.lock().unwrap();
    line.input.extend_from_slice(text.as_bytes());
    line.input.extend_from_slice(b"\r\n");
}

#[tokio::test(start_paused = true)]
async fn test_simulator_emits_parsed_events() {
    let (event_tx, mut rx) = event_channel(64);
    let handle = spawn_device(config(PtrType::Simulate), event_tx);

    wait_for(&mut rx, |e| matches!(e, PanelEvent::Connected { .. })).await;

    let frame = wait_for(&mut rx, |e| matches!(e, PanelEvent::Frame { .. })).await;
    match frame {
        PanelEvent::Frame { device, line } => {
            assert_eq!(device, "alarm");
            assert_eq!(line, SIMULATOR_LINES[0]);
        }
        other => panic!("unexpected event {other:?}"),
    }

    let parsed = wait_for(&mut rx, |e| matches!(e, PanelEvent::Parsed { .. })).await;
    match parsed {
        PanelEvent::Parsed { event, .. } => {
            assert_eq!(event.partition, 2);
            assert_eq!(event.action, ActionType::ZoneClose);
            assert_eq!(event.subject, Some(Subject::Zone(3)));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Second line follows after another delay
    let parsed = wait_for(&mut rx, |e| matches!(e, PanelEvent::Parsed { .. })).await;
    match parsed {
        PanelEvent::Parsed { event, .. } => assert_eq!(event.subject, Some(Subject::Zone(10))),
        other => panic!("unexpected event {other:?}"),
    }

    assert!(handle.is_connected().await);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_simulator_rejects_commands() {
    let (event_tx, _rx) = event_channel(64);
    let handle = spawn_device(config(PtrType::Simulate), event_tx);

    let result = handle.query(Command::PowerQuery, None).await;
    assert!(matches!(result, Err(PanelError::NotImplemented { .. })));

    // The listener keeps running after a rejected command
    assert!(!handle.is_finished());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_query_and_poll_through_handle() {
    let (panel, line) = ScriptedPanel::new(&[Some("RZ003=80\r:"), Some("PWR=1\r:")]);
    let (event_tx, _rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    let reply = handle
        .query(Command::RequestZoneStatus { zone: 3 }, None)
        .await
        .unwrap();
    assert_eq!(reply, "RZ003=80");

    let power = handle.poll(CommandType::PowerState).await.unwrap();
    assert_eq!(power, PolledValue::Number(1.0));

    assert!(matches!(
        handle.poll(CommandType::User(2)).await,
        Err(PanelError::Unsupported { .. })
    ));

    assert_eq!(line.lock().unwrap().sent, vec!["RZ003", "PWR?"]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_success() {
    let (panel, line) = ScriptedPanel::new(&[None, Some("RA001=00\r:")]);
    let (event_tx, _rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    let first = handle.query(Command::RequestAreaStatus { area: 1 }, None).await;
    assert!(matches!(first, Err(PanelError::Timeout { .. })));

    // Line stays usable after a timeout
    let second = handle.poll(CommandType::AreaStatus(1)).await.unwrap();
    assert_eq!(second, PolledValue::Number(0.0));
    assert!(!handle.is_finished());

    assert_eq!(line.lock().unwrap().sent, vec!["RA001", "RA001"]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_error_token_is_reported() {
    let (panel, _line) = ScriptedPanel::new(&[Some("&FAIL\r:")]);
    let (event_tx, _rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    let result = handle.send_command(Command::ResetAll).await;
    assert!(matches!(result, Err(PanelError::ErrorResponse { .. })));
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_command_reply_never_reaches_listener() {
    let (panel, line) = ScriptedPanel::new(&[Some("RZ007=01\r:")]);
    let (event_tx, mut rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    push_line(&line, SIMULATOR_LINES[6]);
    wait_for(&mut rx, |e| matches!(e, PanelEvent::Parsed { .. })).await;

    let reply = handle
        .query(Command::RequestZoneStatus { zone: 7 }, None)
        .await
        .unwrap();
    assert_eq!(reply, "RZ007=01");

    push_line(&line, SIMULATOR_LINES[7]);
    let parsed = wait_for(&mut rx, |e| matches!(e, PanelEvent::Parsed { .. })).await;
    match parsed {
        PanelEvent::Parsed { event, .. } => {
            assert_eq!(event.action, ActionType::BurglaryAlarm);
            assert_eq!(event.subject, Some(Subject::Zone(1)));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Everything the listener saw is buffered; no frame carries reply bytes
    while let Ok(event) = rx.try_recv() {
        if let PanelEvent::Frame { line, .. } = event {
            assert!(!line.contains("RZ007"));
        }
    }
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_command_keeps_partially_received_line() {
    let (panel, line) = ScriptedPanel::new(&[Some("PWR=1\r:")]);
    let (event_tx, mut rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    wait_for(&mut rx, |e| matches!(e, PanelEvent::Connected { .. })).await;

    // Listener picks up the first half of a line
    let (head, tail) = SIMULATOR_LINES[6].split_at(40);
    line.lock().unwrap().input.extend_from_slice(head.as_bytes());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(line.lock().unwrap().input.is_empty());

    // The rest plus a full line are waiting when the command goes out
    {
        let mut line = line.lock().unwrap();
        line.input.extend_from_slice(tail.as_bytes());
        line.input.extend_from_slice(b"\r\n");
    }
    push_line(&line, SIMULATOR_LINES[7]);
    let reply = handle.query(Command::PowerQuery, None).await.unwrap();
    assert_eq!(reply, "PWR=1");
    push_line(&line, SIMULATOR_LINES[1]);

    let mut frames = Vec::new();
    let mut subjects = Vec::new();
    while subjects.len() < 3 {
        match wait_for(&mut rx, |e| {
            matches!(e, PanelEvent::Frame { .. } | PanelEvent::Parsed { .. })
        })
        .await
        {
            PanelEvent::Frame { line, .. } => frames.push(line),
            PanelEvent::Parsed { event, .. } => subjects.push(event.subject),
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(
        frames,
        vec![SIMULATOR_LINES[6], SIMULATOR_LINES[7], SIMULATOR_LINES[1]]
    );
    assert_eq!(
        subjects,
        vec![
            Some(Subject::Zone(3)),
            Some(Subject::Zone(1)),
            Some(Subject::Zone(10))
        ]
    );
    assert_eq!(line.lock().unwrap().sent, vec!["PWR?"]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_client_query_does_not_hold_registry() {
    let (panel, _line) = ScriptedPanel::new(&[None]);
    let (event_tx, _rx) = event_channel(64);
    let mut registry = DeviceRegistry::new();
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);
    registry.insert(handle).await;
    let registry = Arc::new(tokio::sync::Mutex::new(registry));

    let client = registry.lock().await.client("alarm").unwrap();
    let pending = tokio::spawn(async move { client.query(Command::PowerQuery, None).await });

    // Unanswered command in flight; the registry stays available
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!pending.is_finished());
    assert!(registry.try_lock().is_ok());

    assert!(matches!(
        pending.await.unwrap(),
        Err(PanelError::Timeout { .. })
    ));
    registry.lock().await.shutdown_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_unrecognised_lines_are_skipped() {
    let (panel, line) = ScriptedPanel::new(&[]);
    let (event_tx, mut rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    // System Area lines match no grammar, unknown phrases are dropped
    push_line(&line, SIMULATOR_LINES[8]);
    push_line(&line, "2014/01/14 17:01  Partition 2    Zone exploded            Zone 3");
    push_line(&line, SIMULATOR_LINES[9]);

    let parsed = wait_for(&mut rx, |e| matches!(e, PanelEvent::Parsed { .. })).await;
    match parsed {
        PanelEvent::Parsed { event, .. } => {
            assert_eq!(event.partition, 4);
            assert_eq!(event.action, ActionType::DuressAlarm);
            assert_eq!(event.subject, Some(Subject::User(2)));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(!handle.is_finished());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_line_failure_stops_task() {
    let (panel, line) = ScriptedPanel::new(&[]);
    let (event_tx, mut rx) = event_channel(64);
    let handle = spawn_device_with(config(PtrType::Ptr3), Box::new(panel), event_tx);

    wait_for(&mut rx, |e| matches!(e, PanelEvent::Connected { .. })).await;
    line.lock().unwrap().fail_reads = true;
    wait_for(&mut rx, |e| matches!(e, PanelEvent::Disconnected { .. })).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("device task did not stop");

    assert!(!handle.is_connected().await);
    assert!(matches!(
        handle.query(Command::PowerQuery, None).await,
        Err(PanelError::Disconnected)
    ));
    handle.shutdown().await;
}
