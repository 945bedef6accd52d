/**
 * Errors that can stop a component from doing its job. A marker that wasn't
 * seen this frame is not one of them; that shows up as an absent value.
 */
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to decode frame: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] paho_mqtt::Error),

    #[error("Unable to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown command token '{0}'")]
    UnknownCommand(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Connection lost, gave up after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    #[error("Unable to initialize logger: {0}")]
    Logger(String),
}
