/**
 * Gets drive commands from the station to the robot. Delivery is at most
 * once with no acknowledgement; the robot stops on its own if commands stop
 * arriving, so losing one is fine.
 */
use std::time::Duration;

use paho_mqtt::{Client, ConnectOptionsBuilder, CreateOptionsBuilder, Message};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{Error, Result};

const QOS_AT_MOST_ONCE: i32 = 0;


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub topic: String,
    pub station_client_id: String,
    pub actuator_client_id: String,
    pub keep_alive_s: u64,
}


impl Default for MqttConfig {
    fn default() -> MqttConfig {
        MqttConfig {
            broker: "tcp://localhost:1883".to_string(),
            topic: "robot/command".to_string(),
            station_client_id: "seek_station".to_string(),
            actuator_client_id: "seek_actuator".to_string(),
            keep_alive_s: 20,
        }
    }
}


/// Provides an interface to send commands to the robot.
pub trait Transport {
    /// Publishes a single command. Returning Ok doesn't mean it arrived.
    fn send(&mut self, command: Command) -> Result<()>;
    fn is_connected(&self) -> bool;
    fn reconnect(&mut self) -> Result<()>;
    fn disconnect(&mut self);
}


fn connect_client(config: &MqttConfig, client_id: &str) -> Result<Client> {
    let create_options = CreateOptionsBuilder::new()
        .server_uri(config.broker.as_str())
        .client_id(client_id)
        .finalize();
    let client = Client::new(create_options)?;
    let connect_options = ConnectOptionsBuilder::new()
        .keep_alive_interval(Duration::from_secs(config.keep_alive_s))
        .clean_session(true)
        .finalize();
    client.connect(connect_options)?;
    Ok(client)
}


/**
 * Publishes commands to an MQTT broker. The paho client runs its own network
 * thread; nothing here blocks waiting for delivery.
 */
pub struct MqttTransport {
    client: Client,
    topic: String,
}


impl MqttTransport {
    pub fn connect(config: &MqttConfig) -> Result<MqttTransport> {
        info!("Connecting to MQTT broker {} as {}", config.broker, config.station_client_id);
        let client = connect_client(config, &config.station_client_id)?;
        info!("MQTT connected: {}", config.broker);
        Ok(MqttTransport {
            client: client,
            topic: config.topic.clone(),
        })
    }
}


impl Transport for MqttTransport {
    fn send(&mut self, command: Command) -> Result<()> {
        if !self.client.is_connected() {
            return Err(Error::NotConnected);
        }
        let message = Message::new(self.topic.as_str(), command.token(), QOS_AT_MOST_ONCE);
        self.client.publish(message)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    fn reconnect(&mut self) -> Result<()> {
        self.client.reconnect()?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.client.is_connected() {
            return;
        }
        match self.client.disconnect(None) {
            Ok(_) => info!("MQTT disconnected"),
            Err(e) => warn!("Unable to disconnect from MQTT broker: {}", e),
        }
    }
}


/**
 * Sends nothing anywhere. Used for dry runs without a broker.
 */
pub struct LogTransport {
    sent: u64,
}


impl LogTransport {
    pub fn new() -> LogTransport {
        LogTransport { sent: 0 }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}


impl Transport for LogTransport {
    fn send(&mut self, command: Command) -> Result<()> {
        self.sent += 1;
        info!("Dry run, would send {}", command);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}
}


#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Poll {
    Token(String),
    Idle,
    Disconnected,
}


/// Provides an interface to receive commands on the robot.
pub trait CommandReceiver {
    /// Waits up to `timeout` for the next payload.
    fn poll(&mut self, timeout: Duration) -> Poll;
    /// Reconnects and picks up the command topic again.
    fn reconnect(&mut self) -> Result<()>;
    fn disconnect(&mut self);
}


/**
 * The robot end of the link. Subscribes to the command topic and hands out
 * raw payloads; parsing them is the engine's business.
 */
pub struct MqttCommandReceiver {
    client: Client,
    messages: paho_mqtt::Receiver<Option<Message>>,
    topic: String,
}


impl MqttCommandReceiver {
    pub fn connect(config: &MqttConfig) -> Result<MqttCommandReceiver> {
        info!("Connecting to MQTT broker {} as {}", config.broker, config.actuator_client_id);
        let create_options = CreateOptionsBuilder::new()
            .server_uri(config.broker.as_str())
            .client_id(config.actuator_client_id.as_str())
            .finalize();
        let client = Client::new(create_options)?;
        // Consuming has to start before connecting or early messages are lost
        let messages = client.start_consuming();
        let connect_options = ConnectOptionsBuilder::new()
            .keep_alive_interval(Duration::from_secs(config.keep_alive_s))
            .clean_session(true)
            .finalize();
        client.connect(connect_options)?;
        client.subscribe(config.topic.as_str(), QOS_AT_MOST_ONCE)?;
        info!("Listening for commands on {}", config.topic);
        Ok(MqttCommandReceiver {
            client: client,
            messages: messages,
            topic: config.topic.clone(),
        })
    }
}


impl CommandReceiver for MqttCommandReceiver {
    fn poll(&mut self, timeout: Duration) -> Poll {
        match self.messages.recv_timeout(timeout) {
            Ok(Some(message)) => Poll::Token(message.payload_str().into_owned()),
            // paho signals a dropped connection with an empty message
            Ok(None) => Poll::Disconnected,
            Err(_) => {
                if self.client.is_connected() {
                    Poll::Idle
                } else {
                    Poll::Disconnected
                }
            }
        }
    }

    /**
     * Reconnects and subscribes again; clean sessions forget subscriptions.
     */
    fn reconnect(&mut self) -> Result<()> {
        self.client.reconnect()?;
        self.client.subscribe(self.topic.as_str(), QOS_AT_MOST_ONCE)?;
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.client.is_connected() {
            return;
        }
        match self.client.disconnect(None) {
            Ok(_) => info!("MQTT disconnected"),
            Err(e) => warn!("Unable to disconnect from MQTT broker: {}", e),
        }
    }
}


/**
 * Brings a link back up, trying up to `attempts` times with `delay` between
 * tries. `reconnect` is whatever the link uses to reconnect itself.
 */
pub fn reconnect_with_retries<F>(mut reconnect: F, attempts: u32, delay: Duration) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    for attempt in 1..=attempts {
        warn!("Connection lost, reconnect attempt {}/{}", attempt, attempts);
        match reconnect() {
            Ok(_) => {
                info!("Reconnected after {} attempt(s)", attempt);
                return Ok(());
            }
            Err(e) => {
                error!("Reconnect attempt {} failed: {}", attempt, e);
                if attempt < attempts {
                    std::thread::sleep(delay);
                }
            }
        }
    }
    Err(Error::ConnectionLost { attempts: attempts })
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{LogTransport, Transport, reconnect_with_retries};
    use crate::command::Command;
    use crate::error::Error;

    #[test]
    fn test_log_transport() {
        let mut transport = LogTransport::new();
        assert!(transport.is_connected());
        assert!(transport.send(Command::MoveForward).is_ok());
        assert!(transport.send(Command::Stop).is_ok());
        assert!(transport.sent() == 2);
    }

    #[test]
    fn test_reconnect_eventually() {
        let mut calls = 0;
        let result = reconnect_with_retries(
            || {
                calls += 1;
                if calls < 3 { Err(Error::NotConnected) } else { Ok(()) }
            },
            5,
            Duration::from_millis(0));
        assert!(result.is_ok());
        assert!(calls == 3);
    }

    #[test]
    fn test_reconnect_gives_up() {
        let mut calls = 0;
        let result = reconnect_with_retries(
            || {
                calls += 1;
                Err(Error::NotConnected)
            },
            4,
            Duration::from_millis(0));
        match result {
            Err(Error::ConnectionLost { attempts }) => assert!(attempts == 4),
            _ => panic!("Expected ConnectionLost"),
        }
        assert!(calls == 4);
    }

    #[test]
    fn test_reconnect_with_huge_limit() {
        let mut calls = 0;
        let result = reconnect_with_retries(
            || {
                calls += 1;
                Ok(())
            },
            u32::MAX,
            Duration::from_millis(0));
        assert!(result.is_ok());
        assert!(calls == 1);
    }
}
