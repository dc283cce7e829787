//! End-to-end behavior of two channels talking to each other.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Barrier;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use isormi::ChannelBuilder;
use isormi::CriticalLog;
use isormi::Error;
use isormi::Interface;
use isormi::ObjectRef;
use isormi::RemoteMessage;
use isormi::RemoteMethodSignature;
use isormi::RemoteReturn;
use isormi::RemoteStub;
use isormi::Value;
use isormi::mock::Loopback;
use isormi::mock::loopback_pair;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Calc;

/// Blocks every call on `hold` until the test releases the barrier.
struct Slow {
    gate: Arc<Barrier>,
}

/// Checks what a bean reference resolved to on the receiving side.
struct BeanProbe {
    expected: ObjectRef,
}

#[derive(Default, Clone)]
struct RecordingLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CriticalLog for RecordingLog {
    fn critical(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

fn calc_interface() -> Interface {
    Interface::new("Calc")
        .method("add", ["int", "int"], |_: &Calc, mut args| {
            let a: i64 = args.take(0)?;
            let b: i64 = args.take(1)?;
            Ok(Value::Int(a + b))
        })
        .method("fail", ["string"], |_: &Calc, mut args| {
            let message: String = args.take(0)?;
            Err(isormi::RemoteFailure::new("IllegalStateException", message))
        })
        .method("echo", ["object"], |_: &Calc, mut args| args.take::<Value>(0))
        .method("isLocal", ["object"], |_: &Calc, mut args| {
            let obj: ObjectRef = args.take(0)?;
            Ok(Value::Bool(obj.is::<Calc>()))
        })
        .method("jitter", ["long"], |_: &Calc, mut args| {
            let n: i64 = args.take(0)?;
            let delay = rand::thread_rng().gen_range(0..3);
            std::thread::sleep(Duration::from_millis(delay));
            Ok(Value::Int(n))
        })
}

fn slow_interface() -> Interface {
    Interface::new("Slow").method("hold", Vec::<&str>::new(), |slow: &Slow, _| {
        slow.gate.wait();
        Ok(Value::Unit)
    })
}

fn bean_interface() -> Interface {
    Interface::new("Beans")
        .method("isExpected", ["object"], |probe: &BeanProbe, mut args| {
            let obj: ObjectRef = args.take(0)?;
            Ok(Value::Bool(obj.ptr_eq(&probe.expected)))
        })
        .method("isUnit", ["object"], |_: &BeanProbe, args| Ok(Value::Bool(args.get::<Value>(0)?.is_unit())))
}

fn builder(name: &str) -> ChannelBuilder {
    ChannelBuilder::new()
        .name(name)
        .interface(calc_interface())
        .interface(slow_interface())
        .interface(bean_interface())
}

fn pair() -> Loopback {
    init_tracing();
    loopback_pair(builder("left"), builder("right"))
}

/// Exports `obj` on the right and hands the left side its stub.
fn serve(lb: &Loopback, iface: &str, obj: ObjectRef) -> Arc<RemoteStub> {
    let instance = lb.right.export_object([iface], obj);
    lb.left.stub(&instance).unwrap()
}

async fn wait_for_pending(lb: &Loopback, count: usize) -> Result<Vec<u64>> {
    let pending = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let pending = lb.left.pending_calls();
            if pending.len() >= count {
                return pending;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await?;
    Ok(pending)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_success_path_exchanges_one_pair() -> Result<()> {
    let lb = pair();
    let calc = serve(&lb, "Calc", ObjectRef::new(Calc));

    let sum = calc.call_async("add", ["int", "int"], vec![Value::Int(2), Value::Int(3)]).await?;

    assert_eq!(sum, Value::Int(5));
    assert_eq!(lb.call_count(), 1);
    assert_eq!(lb.return_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_caller_on_worker_thread() -> Result<()> {
    let lb = pair();
    let calc = serve(&lb, "Calc", ObjectRef::new(Calc));

    let sum = tokio::task::spawn_blocking(move || calc.call("add", ["i32", "i32"], vec![Value::Int(20), Value::Int(22)])).await??;

    assert_eq!(sum, Value::Int(42));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_application_exception_keeps_channel_open() -> Result<()> {
    let lb = pair();
    let calc = serve(&lb, "Calc", ObjectRef::new(Calc));

    let err = calc.call_async("fail", ["string"], vec!["boom".into()]).await.unwrap_err();

    let failure = err.remote_failure().expect("remote failure");
    assert_eq!(failure.kind, "IllegalStateException");
    assert_eq!(failure.message, "boom");
    assert!(!err.is_communication());
    assert!(!lb.left.is_closed());
    assert!(!lb.right.is_closed());

    let sum = calc.call_async("add", ["int", "int"], vec![Value::Int(1), Value::Int(1)]).await?;
    assert_eq!(sum, Value::Int(2));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_round_trip_identity_resolves_to_original() -> Result<()> {
    let lb = pair();
    let original = ObjectRef::new(Calc);
    let calc = serve(&lb, "Calc", original.clone());
    let as_stub = ObjectRef::from_arc(calc.clone());

    // the stub travels back as the right side's own identity
    let is_local = calc.call_async("isLocal", ["object"], vec![Value::Object(as_stub.clone())]).await?;
    assert_eq!(is_local, Value::Bool(true));

    // and the answer comes back as the very same stub
    let echoed = calc.call_async("echo", ["object"], vec![Value::Object(as_stub.clone())]).await?;
    assert!(echoed.as_object().unwrap().ptr_eq(&as_stub));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_is_stable_across_returns() -> Result<()> {
    let lb = pair();
    let calc = serve(&lb, "Calc", ObjectRef::new(Calc));
    let other = lb.right.export_object(["Calc"], ObjectRef::new(Calc));

    let first = calc.call_async("echo", ["object"], vec![Value::Remote(other.clone())]).await?;
    let second = calc.call_async("echo", ["object"], vec![Value::Remote(other.clone())]).await?;

    let first = first.as_object().unwrap();
    assert!(first.ptr_eq(second.as_object().unwrap()));
    assert_eq!(RemoteStub::from_object(first).unwrap().instance(), &other);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_call_ids_are_distinct() -> Result<()> {
    let lb = pair();
    let calc = serve(&lb, "Calc", ObjectRef::new(Calc));

    let mut tasks = Vec::new();
    for n in 0..64i64 {
        let calc = calc.clone();
        tasks.push(tokio::spawn(async move {
            calc.call_async("jitter", ["long"], vec![n.into()]).await
        }));
    }
    for (n, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await??, Value::Int(n as i64));
    }

    let ids: Vec<u64> = lb
        .messages()
        .iter()
        .filter_map(|m| match m {
            RemoteMessage::Call(call) => Some(call.call_id),
            RemoteMessage::Return(_) => None,
        })
        .collect();
    let unique: HashSet<u64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 64);
    assert_eq!(unique.len(), 64);
    assert_eq!(lb.return_count(), 64);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_mid_call_unblocks_caller() -> Result<()> {
    let lb = pair();
    let gate = Arc::new(Barrier::new(2));
    let slow = serve(&lb, "Slow", ObjectRef::new(Slow { gate: gate.clone() }));

    let caller = tokio::task::spawn_blocking(move || slow.call("hold", Vec::<&str>::new(), vec![]));
    wait_for_pending(&lb, 1).await?;

    lb.left.close();

    let err = tokio::time::timeout(Duration::from_secs(5), caller).await??.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));

    tokio::task::spawn_blocking(move || gate.wait()).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_drains_every_pending_call_once() -> Result<()> {
    let lb = pair();
    let gate = Arc::new(Barrier::new(5));
    let slow = serve(&lb, "Slow", ObjectRef::new(Slow { gate: gate.clone() }));

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let slow = slow.clone();
            tokio::spawn(async move { slow.call_async("hold", Vec::<&str>::new(), vec![]).await })
        })
        .collect();
    wait_for_pending(&lb, 4).await?;

    lb.left.close();
    lb.left.close();

    for caller in callers {
        let err = caller.await?.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
    assert!(lb.left.pending_calls().is_empty());

    tokio::task::spawn_blocking(move || gate.wait()).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_racing_with_blocking_callers() -> Result<()> {
    for _ in 0..25 {
        let lb = pair();
        let calc = serve(&lb, "Calc", ObjectRef::new(Calc));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let calc = calc.clone();
                tokio::task::spawn_blocking(move || {
                    (0..20)
                        .map(|_| calc.call("add", ["i32", "i32"], vec![Value::Int(2), Value::Int(3)]))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let delay = rand::thread_rng().gen_range(0..300);
        let left = lb.left.clone();
        let closer = tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_micros(delay));
            left.close();
        });

        for caller in callers {
            let outcomes = tokio::time::timeout(Duration::from_secs(10), caller).await??;
            for outcome in outcomes {
                match outcome {
                    Ok(value) => assert_eq!(value, Value::Int(5)),
                    Err(Error::ConnectionClosed) | Err(Error::Transport(_)) => {}
                    Err(other) => panic!("unexpected outcome: {other}"),
                }
            }
        }
        closer.await?;

        assert!(lb.left.is_closed());
        assert!(lb.left.pending_calls().is_empty());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_orphan_return_closes_channel_and_fails_callers() -> Result<()> {
    let lb = pair();
    let gate = Arc::new(Barrier::new(2));
    let slow = serve(&lb, "Slow", ObjectRef::new(Slow { gate: gate.clone() }));

    let caller = tokio::spawn(async move { slow.call_async("hold", Vec::<&str>::new(), vec![]).await });
    wait_for_pending(&lb, 1).await?;

    let orphan = RemoteMessage::Return(RemoteReturn::success(987_654, Value::Unit));
    assert!(matches!(lb.left.handle_message(orphan), Err(Error::Protocol(_))));
    assert!(lb.left.is_closed());

    let err = caller.await?.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));

    tokio::task::spawn_blocking(move || gate.wait()).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_interrupt_wakes_blocked_caller() -> Result<()> {
    let lb = pair();
    let gate = Arc::new(Barrier::new(2));
    let slow = serve(&lb, "Slow", ObjectRef::new(Slow { gate: gate.clone() }));

    let caller = tokio::task::spawn_blocking(move || slow.call("hold", Vec::<&str>::new(), vec![]));
    let pending = wait_for_pending(&lb, 1).await?;

    assert!(lb.left.interrupt(pending[0]));
    let err = caller.await?.unwrap_err();
    assert!(matches!(err, Error::Interrupted));

    // the late return is absorbed
    tokio::task::spawn_blocking(move || gate.wait()).await?;
    tokio::time::timeout(Duration::from_secs(5), async {
        while lb.return_count() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await?;
    assert!(!lb.left.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_async_call_is_abandoned() -> Result<()> {
    let lb = pair();
    let gate = Arc::new(Barrier::new(2));
    let slow = serve(&lb, "Slow", ObjectRef::new(Slow { gate: gate.clone() }));

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        slow.call_async("hold", Vec::<&str>::new(), vec![]),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(lb.left.pending_calls().is_empty());

    tokio::task::spawn_blocking(move || gate.wait()).await?;
    tokio::time::timeout(Duration::from_secs(5), async {
        while lb.return_count() == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await?;
    assert!(!lb.left.is_closed());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_send_to_closed_peer_closes_caller() -> Result<()> {
    let lb = pair();
    let calc = serve(&lb, "Calc", ObjectRef::new(Calc));
    lb.right.close();

    let err = calc.call_async("add", ["int", "int"], vec![Value::Int(1), Value::Int(2)]).await.unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    assert!(lb.left.is_closed());
    tokio::time::timeout(Duration::from_secs(1), lb.left.closed()).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_named_bean_resolves_on_receiver() -> Result<()> {
    init_tracing();
    let left_bean = ObjectRef::new(Calc);
    let right_bean = ObjectRef::new(Calc);
    let lb = loopback_pair(builder("left"), builder("right"));
    lb.left.register_named_bean("calculator", left_bean.clone());
    lb.right.register_named_bean("calculator", right_bean.clone());

    let probe = serve(&lb, "Beans", ObjectRef::new(BeanProbe { expected: right_bean }));
    let out = probe.call_async("isExpected", ["object"], vec![Value::Object(left_bean)]).await?;

    assert_eq!(out, Value::Bool(true));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_bean_is_logged_and_nulled() -> Result<()> {
    init_tracing();
    let log = RecordingLog::default();
    let lb = loopback_pair(builder("left"), builder("right").critical_log(log.clone()));
    let solo = ObjectRef::new(Calc);
    lb.left.register_named_bean("solo", solo.clone());

    let probe = serve(&lb, "Beans", ObjectRef::new(BeanProbe { expected: ObjectRef::new(Calc) }));
    let out = probe.call_async("isUnit", ["object"], vec![Value::Object(solo)]).await?;

    assert_eq!(out, Value::Bool(true));
    assert!(!lb.right.is_closed());
    let lines = log.lines.lock().unwrap();
    assert_eq!(lines.as_slice(), ["Cannot resolve bean named 'solo'".to_string()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unexported_target_is_call_scoped() -> Result<()> {
    let lb = pair();
    let ghost = isormi::RemoteInstance::generate(["Calc"]);
    let sig = RemoteMethodSignature::new("Calc", "add", ["int", "int"]);

    let err = lb
        .left
        .invoke_remote_async(&ghost, &sig, vec![Value::Int(1), Value::Int(2)])
        .await
        .unwrap_err();

    assert!(err.remote_failure().unwrap().message.contains("has not been exported"));
    assert!(!lb.left.is_closed());
    assert!(!lb.right.is_closed());
    Ok(())
}
