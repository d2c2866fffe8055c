use clap::{Parser, Subcommand};
use ddsm210::{
    DeviceId, Motor,
    command::{Drive, MotionMode, Setpoint, acceleration_from_millis},
    serial::{self, SerialTransport},
};
use std::{error::Error, time::Duration};
use strum::VariantNames;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Bus id of the motor (hex format, e.g. `0x01`)
    #[arg(short, long, value_parser = parse_hex, default_value = "0x01")]
    id: u8,

    /// Time to wait for a reply in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Send a setpoint and print the drive telemetry
    Drive {
        /// Velocity in rpm, or angle in degrees with `--position`
        #[arg(allow_negative_numbers = true)]
        value: f32,

        /// Interpret the value as a position in degrees
        #[arg(long, default_value = "false")]
        position: bool,

        /// Acceleration time per 1 rpm in milliseconds
        #[arg(short, long, default_value_t = 0.0)]
        acceleration_ms: f32,

        /// Engage the brake
        #[arg(short, long, default_value = "false")]
        brake: bool,
    },
    /// Engage the brake and print the drive telemetry
    Brake,
    /// Print the accumulated laps and the shaft position
    Feedback,
    /// Print the current motion mode
    Mode,
    /// Switch the motion mode
    SwitchMode {
        /// Target mode
        #[arg(value_parser = parse_mode)]
        mode: MotionMode,
    },
    /// Assign a new bus id (the only motor on the bus must be freshly powered up)
    SetId {
        /// New bus id (hex format, e.g. `0x02`)
        #[arg(value_parser = parse_hex)]
        id: u8,
    },
}

fn parse_hex(s: &str) -> Result<u8, std::num::ParseIntError> {
    if let Some(stripped) = s.strip_prefix("0x") {
        u8::from_str_radix(stripped, 16)
    } else {
        u8::from_str_radix(s, 16)
    }
}

fn parse_mode(s: &str) -> Result<MotionMode, String> {
    s.parse()
        .map_err(|_| format!("expected one of: {}", MotionMode::VARIANTS.join(", ")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();

    let port = serial::open(&args.port)?;
    let transport = SerialTransport::new(port, Duration::from_millis(args.timeout_ms));
    let mut motor = Motor::new(transport, DeviceId::new(args.id)?);

    match args.command {
        Action::Drive {
            value,
            position,
            acceleration_ms,
            brake,
        } => {
            let setpoint = if position {
                Setpoint::from_degrees(value)?
            } else {
                Setpoint::from_rpm(value)?
            };
            let mut drive =
                Drive::new(setpoint).with_acceleration(acceleration_from_millis(acceleration_ms));

            drive.brake = brake;

            println!("{}", motor.drive(drive).await?);
        }
        Action::Brake => println!("{}", motor.brake().await?),
        Action::Feedback => println!("{}", motor.query_feedback().await?),
        Action::Mode => println!("{}", motor.query_mode().await?),
        Action::SwitchMode { mode } => match motor.switch_mode(mode).await? {
            Some(reply) => println!("Switched to {mode} mode, reply: {:02x?}", reply.as_bytes()),
            None => println!("Switched to {mode} mode, no reply"),
        },
        Action::SetId { id } => {
            println!("Assigning id {id:#04x}, this takes effect once per power cycle");

            let id = motor.assign_id(id).await?;

            println!("Motor now answers to id {id}");
        }
    }

    Ok(())
}
