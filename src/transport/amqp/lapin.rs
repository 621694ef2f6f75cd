//! AMQP transport implementation using `lapin`.
//!
//! ## Concurrency model
//!
//! A single background actor task owns the AMQP connection and channel and
//! serializes every publish, queue declaration and shutdown. Consumer tasks,
//! one per consumed queue, fan deliveries out to local subscriber inboxes.
//! When a consumer stops (channel error, broker cancel) it reports back to the
//! actor, which forgets the queue and closes its inboxes so subscribers see
//! the end of their stream instead of silence.
//!
//! ## Wire format
//!
//! The message body is the JSON-encoded [`Envelope`]. The envelope's
//! correlation id, reply address and content type are mirrored into the AMQP
//! `correlation_id`, `reply_to` and `content_type` properties so broker tooling
//! can see them.
//!
//! ## Routing
//!
//! Envelopes are published to the configured exchange with the envelope
//! address as routing key. Consumed queues are declared non-durable and
//! auto-delete, and bound to the exchange under their own name when the
//! exchange is not the default one.

use lapin::{
    //
    options::{
        //
        BasicAckOptions,
        BasicConsumeOptions,
        BasicPublishOptions,
        ExchangeDeclareOptions,
        QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties,
    Channel,
    Connection,
    ConnectionProperties,
    ExchangeKind,
};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::{
    //
    Envelope,
    Result,
    RpcConfig,
    RpcError,
    Subscription,
    SubscriptionHandle,
    Transport,
    TransportPtr,
};

type SubscriberMap = Arc<RwLock<HashMap<String, Vec<mpsc::Sender<Envelope>>>>>;

const COMMAND_CAPACITY: usize = 64;
const INBOX_CAPACITY: usize = 64;

//
// Actor commands
//

enum Cmd {
    //
    Publish {
        env: Envelope,
        resp: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        queue: String,
        inbox: mpsc::Sender<Envelope>,
        resp: oneshot::Sender<Result<()>>,
    },
    ConsumerEnded {
        queue: String,
    },
    Close {
        resp: oneshot::Sender<Result<()>>,
    },
}

/// AMQP transport backed by one connection and one channel.
pub struct AmqpTransport {
    // ---
    transport_id: String,
    cmd_tx: mpsc::Sender<Cmd>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl AmqpTransport {
    /// Spawn the actor owning `connection` and `channel`.
    fn create(
        transport_id: &str,
        exchange: String,
        connection: Connection,
        channel: Channel,
    ) -> TransportPtr {
        // ---
        let transport_id = transport_id.to_string();

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = Actor {
            transport_id: transport_id.clone(),
            exchange,
            connection,
            channel,
            cmd_rx,
            cmd_tx: cmd_tx.downgrade(),
            queues: Queues::new(),
        };

        let handle = tokio::spawn(actor.run());

        Arc::new(Self {
            transport_id,
            cmd_tx,
            actor: Mutex::new(Some(handle)),
        })
    }

    async fn send_cmd(&self, cmd: Cmd, rx: oneshot::Receiver<Result<()>>) -> Result<()> {
        // ---
        self.cmd_tx.send(cmd).await.map_err(|e| {
            RpcError::Transport(format!("amqp: actor command channel closed: {e}"))
        })?;

        rx.await.map_err(|e| {
            RpcError::Transport(format!("amqp: actor dropped the response: {e}"))
        })?
    }
}

/// Background actor task that owns the AMQP connection and channel.
struct Actor {
    // ---
    transport_id: String,
    exchange: String,
    connection: Connection,
    channel: Channel,
    cmd_rx: mpsc::Receiver<Cmd>,
    /// Handed to consumer tasks; weak so they do not keep the actor alive.
    cmd_tx: mpsc::WeakSender<Cmd>,
    queues: Queues,
}

/// Local inboxes and consumer tasks, keyed by queue name.
struct Queues {
    // ---
    subscribers: SubscriberMap,
    consumers: HashMap<String, JoinHandle<()>>,
}

impl Queues {
    fn new() -> Self {
        // ---
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            consumers: HashMap::new(),
        }
    }

    fn is_consuming(&self, queue: &str) -> bool {
        self.consumers.contains_key(queue)
    }

    async fn add_subscriber(&self, queue: &str, inbox: mpsc::Sender<Envelope>) {
        // ---
        let mut map = self.subscribers.write().await;
        let senders = map.entry(queue.to_string()).or_default();
        senders.retain(|s| !s.is_closed());
        senders.push(inbox);
    }

    fn add_consumer(&mut self, queue: String, handle: JoinHandle<()>) {
        self.consumers.insert(queue, handle);
    }

    /// Forget a queue whose consumer stopped. Its inboxes close; returns how
    /// many were open.
    async fn retire(&mut self, queue: &str) -> usize {
        // ---
        self.consumers.remove(queue);
        self.subscribers
            .write()
            .await
            .remove(queue)
            .map_or(0, |senders| senders.len())
    }

    /// Stop every consumer and close every inbox.
    async fn close_all(&mut self) {
        // ---
        for (_, handle) in self.consumers.drain() {
            handle.abort();
        }
        self.subscribers.write().await.clear();
    }
}

/// Hand one delivery to every local inbox subscribed to `queue`.
async fn fan_out(subscribers: &SubscriberMap, queue: &str, envelope: Envelope, transport_id: &str) {
    // ---
    let subs = subscribers.read().await;
    if let Some(senders) = subs.get(queue) {
        for sender in senders {
            if let Err(e) = sender.send(envelope.clone()).await {
                tracing::debug!(%transport_id, %queue, "subscriber inbox closed: {e}");
            }
        }
    }
}

impl Actor {
    async fn run(mut self) {
        // ---
        tracing::info!(transport_id = %self.transport_id, "AMQP actor started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                Cmd::Publish { env, resp } => {
                    let result = self.do_publish(env).await;
                    let _ = resp.send(result);
                }
                Cmd::Subscribe { queue, inbox, resp } => {
                    let result = self.do_subscribe(queue, inbox).await;
                    let _ = resp.send(result);
                }
                Cmd::ConsumerEnded { queue } => {
                    let closed = self.queues.retire(&queue).await;
                    tracing::warn!(
                        transport_id = %self.transport_id,
                        %queue,
                        closed,
                        "consumer stopped, closing subscriber inboxes"
                    );
                }
                Cmd::Close { resp } => {
                    let _ = resp.send(Ok(()));
                    break;
                }
            }
        }

        self.queues.close_all().await;

        let _ = self.channel.close(200, "Normal shutdown".into()).await;
        let _ = self.connection.close(200, "Normal shutdown".into()).await;

        tracing::info!(transport_id = %self.transport_id, "AMQP actor stopped");
    }

    async fn do_publish(&mut self, env: Envelope) -> Result<()> {
        // ---
        let routing_key = env.address.as_str().to_string();

        let mut properties = BasicProperties::default();
        if let Some(id) = &env.correlation_id {
            properties = properties.with_correlation_id(id.as_ref().into());
        }
        if let Some(reply_to) = &env.reply_to {
            properties = properties.with_reply_to(reply_to.as_str().into());
        }
        if let Some(content_type) = &env.content_type {
            properties = properties.with_content_type(content_type.as_ref().into());
        }

        let payload = serde_json::to_vec(&env)
            .map_err(|e| RpcError::Transport(format!("amqp: failed to serialize envelope: {e}")))?;

        self.channel
            .basic_publish(
                self.exchange.as_str().into(),
                routing_key.as_str().into(),
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: publish failed: {e}")))?;

        tracing::debug!(
            transport_id = %self.transport_id,
            exchange = %self.exchange,
            routing_key = %routing_key,
            "published"
        );
        Ok(())
    }

    async fn do_subscribe(&mut self, queue: String, inbox: mpsc::Sender<Envelope>) -> Result<()> {
        // ---
        if self.queues.is_consuming(&queue) {
            tracing::debug!(transport_id = %self.transport_id, %queue, "already consuming");
            self.queues.add_subscriber(&queue, inbox).await;
            return Ok(());
        }

        let queue_opts = QueueDeclareOptions {
            passive: false,
            durable: false,
            exclusive: false,
            auto_delete: true,
            nowait: false,
        };

        self.channel
            .queue_declare(queue.as_str(), queue_opts, FieldTable::default())
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: queue declare failed: {e}")))?;

        if !self.exchange.is_empty() {
            self.channel
                .queue_bind(
                    queue.as_str(),
                    self.exchange.as_str(),
                    queue.as_str(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| RpcError::Transport(format!("amqp: queue bind failed: {e}")))?;
        }

        let consumer = self
            .channel
            .basic_consume(
                queue.as_str(),
                &format!("{}-{queue}", self.transport_id),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: consume failed: {e}")))?;

        tracing::info!(transport_id = %self.transport_id, %queue, "consuming queue");

        self.queues.add_subscriber(&queue, inbox).await;

        let handle = tokio::spawn(consume(
            consumer,
            queue.clone(),
            self.transport_id.clone(),
            Arc::clone(&self.queues.subscribers),
            self.cmd_tx.clone(),
        ));

        self.queues.add_consumer(queue, handle);
        Ok(())
    }
}

/// Drain one queue's deliveries into the local subscriber inboxes.
async fn consume(
    mut consumer: lapin::Consumer,
    queue: String,
    transport_id: String,
    subscribers: SubscriberMap,
    actor: mpsc::WeakSender<Cmd>,
) {
    // ---
    use futures_lite::stream::StreamExt;

    while let Some(delivery_result) = consumer.next().await {
        let delivery = match delivery_result {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(%transport_id, %queue, "consumer error: {e}");
                break;
            }
        };

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            tracing::error!(%transport_id, %queue, "failed to ack delivery: {e}");
            continue;
        }

        let envelope: Envelope = match serde_json::from_slice(&delivery.data) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(%transport_id, %queue, "dropping undecodable delivery: {e}");
                continue;
            }
        };

        fan_out(&subscribers, &queue, envelope, &transport_id).await;
    }

    tracing::info!(%transport_id, %queue, "consumer task ended");

    if let Some(actor) = actor.upgrade() {
        let _ = actor.send(Cmd::ConsumerEnded { queue }).await;
    }
}

#[async_trait::async_trait]
impl Transport for AmqpTransport {
    // ---
    fn transport_id(&self) -> &str {
        &self.transport_id
    }

    async fn publish(&self, env: Envelope) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.send_cmd(Cmd::Publish { env, resp: tx }, rx).await
    }

    async fn subscribe(&self, sub: Subscription) -> Result<SubscriptionHandle> {
        // ---
        let queue = sub.0.as_ref().to_string();

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

        let (resp_tx, resp_rx) = oneshot::channel();
        self.send_cmd(
            Cmd::Subscribe {
                queue,
                inbox: tx,
                resp: resp_tx,
            },
            resp_rx,
        )
        .await?;

        Ok(SubscriptionHandle { inbox: rx })
    }

    async fn close(&self) -> Result<()> {
        // ---
        let (tx, rx) = oneshot::channel();
        let _ = self.send_cmd(Cmd::Close { resp: tx }, rx).await;

        if let Some(handle) = self.actor.lock().await.take() {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// Create a lapin-backed AMQP transport from the given configuration.
///
/// Connects immediately and declares the configured exchange (direct) when it
/// is not the default exchange.
///
/// # Errors
///
/// Returns [`RpcError::MissingConfig`] without a transport URI and
/// [`RpcError::Transport`] if connecting, opening the channel or declaring
/// the exchange fails.
pub async fn create_transport(config: &RpcConfig) -> Result<TransportPtr> {
    // ---
    let uri = config
        .transport_uri
        .as_deref()
        .ok_or_else(|| RpcError::MissingConfig("transport_uri".into()))?;

    tracing::info!(node_id = %config.node_id, "connecting to AMQP broker");

    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| {
            let msg = format!("amqp: connection failed: {e}");
            tracing::error!("{msg}");
            RpcError::Transport(msg)
        })?;

    let channel = connection.create_channel().await.map_err(|e| {
        let msg = format!("amqp: channel creation failed: {e}");
        tracing::error!("{msg}");
        RpcError::Transport(msg)
    })?;

    if !config.exchange.is_empty() {
        channel
            .exchange_declare(
                config.exchange.as_str(),
                ExchangeKind::Direct,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| RpcError::Transport(format!("amqp: exchange declare failed: {e}")))?;
    }

    tracing::info!(exchange = %config.exchange, "connected to AMQP broker");

    Ok(AmqpTransport::create(
        &config.node_id,
        config.exchange.clone(),
        connection,
        channel,
    ))
}
