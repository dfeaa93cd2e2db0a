//! A library to connect an MQTT broker and manage subscriptions at runtime.
//!
//! ```no_run
//! use mqtt_channel::{Config, Connection, MqttError, StreamExt, TopicFilter};
//!
//! #[tokio::main]
//! async fn main () -> Result<(), MqttError>{
//!     // The connection is established in the background
//!     let mut con = Connection::open(&Config::default());
//!
//!     // Topics can be subscribed at any time, and are resubscribed on reconnect
//!     let devices = TopicFilter::new("hass.agent/devices/+")?;
//!     con.subscriptions.subscribe(&devices).await?;
//!
//!     // The connection status can be observed
//!     let status = *con.status.borrow();
//!     println!("{status}");
//!
//!     // Messages are received from the subscriptions on the received channel
//!     if let Some(message) = con.received.next().await {
//!         println!("{} bytes on {}", message.payload_bytes().len(), message.topic.name);
//!     }
//!
//!     // Closing the connection stops the event loop
//!     con.disconnect.disconnect().await?;
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]

mod config;
mod connection;
mod errors;
mod messages;
mod subscriptions;
mod topics;

pub use config::*;
pub use connection::*;
pub use errors::*;
pub use messages::*;
pub use subscriptions::*;
pub use topics::*;

pub use futures::{channel::mpsc::UnboundedReceiver, StreamExt};

pub use rumqttc::QoS;
