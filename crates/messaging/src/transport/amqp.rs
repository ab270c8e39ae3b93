//! AMQP (RabbitMQ) transport.
//!
//! Publishes to the default exchange with the queue name as routing key, so
//! every logical direction maps to one durable queue.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
};
use tracing::{debug, info};

use super::{Acknowledge, Delivery, DeliveryStream, Transport};
use crate::error::TransportError;

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub user: String,
    pub password: String,
}

impl AmqpConfig {
    /// Builds the broker URI field by field, so credentials and virtual
    /// host are taken verbatim and never reparsed.
    pub fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.user.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            ..Default::default()
        }
    }
}

/// Transport over a single AMQP connection.
pub struct AmqpTransport {
    // Held so the connection lives as long as the transport.
    _connection: Connection,
    channel: Channel,
}

impl AmqpTransport {
    /// Connects to the broker and opens a channel.
    ///
    /// Failure here is fatal for the caller.
    pub async fn connect(config: &AmqpConfig) -> Result<Self, TransportError> {
        info!(host = %config.host, port = config.port, vhost = %config.vhost, "Connecting to AMQP broker");

        let connection = Connection::connect_uri(config.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to create channel: {e}")))?;

        Ok(Self {
            _connection: connection,
            channel,
        })
    }
}

struct AmqpAcker {
    acker: Acker,
    tag: u64,
}

#[async_trait]
impl Acknowledge for AmqpAcker {
    async fn ack(&self) -> Result<(), TransportError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Settle {
                tag: self.tag,
                reason: e.to_string(),
            })
    }

    async fn reject(&self, requeue: bool) -> Result<(), TransportError> {
        self.acker
            .reject(BasicRejectOptions { requeue })
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Settle {
                tag: self.tag,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Declare {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        debug!(queue = %queue, "Declared queue");
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let publish_err = |e: lapin::Error| TransportError::Publish {
            queue: queue.to_string(),
            reason: e.to_string(),
        };

        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(publish_err)?
            .await
            .map_err(publish_err)?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, TransportError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("saga-{queue}"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        let queue = queue.to_string();
        let stream = consumer.map(move |delivery| match delivery {
            Ok(delivery) => Ok(Delivery::new(
                delivery.delivery_tag,
                delivery.data,
                AmqpAcker {
                    acker: delivery.acker,
                    tag: delivery.delivery_tag,
                },
            )),
            Err(e) => Err(TransportError::Consume {
                queue: queue.clone(),
                reason: e.to_string(),
            }),
        });

        Ok(Box::pin(stream))
    }
}
