//! Minimal end-to-end demonstration of wiring a [`CommandProcessor`]
//! through a [`Channel`] and [`MessagePump`] without a configuration
//! loader: connection parameters are plain struct literals, per
//! `spec.md`'s "Config source... owned by external code" collaborator
//! interface.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use brightside::{
    broker::{BrokerConnection, Consumer, ExchangeType},
    channel::Channel,
    errors::ChannelFailureError,
    message::WireMessage,
    processor::CommandProcessor,
    pump::{MessagePump, command_route},
    registry::HandlerRegistry,
    request::{Command, Request, RequestId},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// A consumer with nothing ever queued, standing in for a real broker
/// connection in this demonstration.
struct EmptyConsumer;

#[async_trait]
impl Consumer for EmptyConsumer {
    async fn receive(&self, _timeout: Duration) -> Result<Option<WireMessage>, ChannelFailureError> {
        Ok(None)
    }

    fn acknowledge(&self, _message: &WireMessage) {}

    fn has_acknowledged(&self, _message: &WireMessage) -> bool { false }

    async fn purge(&self) -> Result<(), ChannelFailureError> { Ok(()) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GreetCommand {
    id: RequestId,
    name: String,
}

impl Request for GreetCommand {
    fn id(&self) -> RequestId { self.id }
}

impl Command for GreetCommand {}

struct GreetHandler;

impl brightside::handler::Handler<GreetCommand> for GreetHandler {
    type Error = std::convert::Infallible;

    fn handle(&self, request: &GreetCommand) -> Result<(), Self::Error> {
        tracing::info!(name = %request.name, "greeted");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), brightside::errors::ConfigurationError> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // Connection parameters are ordinary struct literals; this binary
    // does not parse environment variables, files, or CLI flags.
    let _connection =
        BrokerConnection { broker_uri: "amqp://localhost".to_owned(), exchange: "brightside".to_owned(), exchange_type: ExchangeType::Topic, durable: true };

    let mut registry = HandlerRegistry::new();
    registry.register_command::<GreetCommand, _>(|| GreetHandler)?;

    let processor = Arc::new(CommandProcessor::new(registry));
    let channel = Arc::new(Channel::new("greetings", Arc::new(EmptyConsumer) as Arc<dyn Consumer>));

    let mut pump = MessagePump::new(channel, processor, Duration::from_secs(1));
    pump.route("greetings", command_route::<GreetCommand>());

    tracing::info!("brightside pump demo wired; no broker deliveries queued, exiting");
    Ok(())
}
