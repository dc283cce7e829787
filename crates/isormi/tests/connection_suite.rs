//! Channels pumped over byte transports.

use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use isormi::ChannelBuilder;
use isormi::Connection;
use isormi::Error;
use isormi::Interface;
use isormi::ObjectRef;
use isormi::StreamTransport;
use isormi::Transport;
use isormi::Value;
use isormi::mock::DuplexTransport;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Greeter {
    greeting: String,
}

fn greeter_interface() -> Interface {
    Interface::new("Greeter")
        .method("greet", ["string"], |g: &Greeter, mut args| {
            let name: String = args.take(0)?;
            Ok(Value::Str(format!("{}, {}!", g.greeting, name)))
        })
        .method("twin", Vec::<&str>::new(), |_: &Greeter, _| {
            Ok(Value::Object(ObjectRef::new(Greeter {
                greeting: "Hi".to_string(),
            })))
        })
}

fn builder(name: &str) -> ChannelBuilder {
    ChannelBuilder::new()
        .name(name)
        .interface(greeter_interface())
        .marshaler(isormi::ExportByType::new().export::<Greeter, _, _>(["Greeter"]))
}

fn connect<T: Transport>(a: T, b: T) -> (Connection, Connection) {
    init_tracing();
    (Connection::spawn(builder("client"), a), Connection::spawn(builder("server"), b))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_over_duplex_transport() -> Result<()> {
    let (a, b) = DuplexTransport::pair();
    let (client, server) = connect(a, b);

    let greeter = server.channel().export_object(
        ["Greeter"],
        ObjectRef::new(Greeter {
            greeting: "Hello".to_string(),
        }),
    );
    let stub = client.channel().stub(&greeter).unwrap();

    let out = stub.call_async("greet", ["&str"], vec![Value::Str("isolate".into())]).await?;
    assert_eq!(out, Value::Str("Hello, isolate!".into()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_returned_object_is_exported_by_hook() -> Result<()> {
    let (a, b) = DuplexTransport::pair();
    let (client, server) = connect(a, b);

    let greeter = server.channel().export_object(
        ["Greeter"],
        ObjectRef::new(Greeter {
            greeting: "Hello".to_string(),
        }),
    );
    let stub = client.channel().stub(&greeter).unwrap();

    let twin = stub.call_async("twin", Vec::<&str>::new(), vec![]).await?;
    let twin = isormi::RemoteStub::from_value(&twin).expect("a stub");
    assert_ne!(twin.instance(), &greeter);

    let out = twin.call_async("greet", ["String"], vec![Value::Str("there".into())]).await?;
    assert_eq!(out, Value::Str("Hi, there!".into()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_call_over_stream_transport() -> Result<()> {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let (client, server) = connect(StreamTransport::from_stream(left), StreamTransport::from_stream(right));

    let greeter = server.channel().export_object(
        ["Greeter"],
        ObjectRef::new(Greeter {
            greeting: "Hey".to_string(),
        }),
    );
    let stub = client.channel().stub(&greeter).unwrap();

    let out = stub.call_async("greet", ["string"], vec![Value::Str("stream".into())]).await?;
    assert_eq!(out, Value::Str("Hey, stream!".into()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_close_propagates_as_end_of_stream() -> Result<()> {
    let (left, right) = tokio::io::duplex(64 * 1024);
    let (client, server) = connect(StreamTransport::from_stream(left), StreamTransport::from_stream(right));
    let server_channel = server.channel().clone();

    client.close();
    tokio::time::timeout(Duration::from_secs(5), server_channel.closed()).await?;
    assert!(server_channel.is_closed());

    tokio::time::timeout(Duration::from_secs(5), client.join()).await?;
    tokio::time::timeout(Duration::from_secs(5), server.join()).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_undecodable_payload_closes_channel() -> Result<()> {
    init_tracing();
    let (a, b) = DuplexTransport::pair();
    let server = Connection::spawn(builder("server"), b);

    a.send(&[0xc1, 0xc1, 0xc1]).await?;

    tokio::time::timeout(Duration::from_secs(5), server.channel().closed()).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pending_call_fails_when_transport_drops() -> Result<()> {
    init_tracing();
    let (a, b) = DuplexTransport::pair();
    let client = Connection::spawn(builder("client"), a);
    let ghost = isormi::RemoteInstance::generate(["Greeter"]);
    let stub = client.channel().stub(&ghost).unwrap();

    let call = tokio::spawn(async move { stub.call_async("greet", ["string"], vec![Value::Str("nobody".into())]).await });

    // nobody answers; losing the peer ends the stream
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(b);

    let err = tokio::time::timeout(Duration::from_secs(5), call).await??.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    Ok(())
}
