use std::{env, thread, time::Duration};

use anyhow::{anyhow, Result};
use clap::Parser;
use log::{info, warn};
use prioselect::{
    select,
    utils::{
        capacity::Capacity,
        ringchannel::{after, channel},
    },
    Receivable,
};

/// Drains several producers through a priority select, with a global timeout
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of producer channels. Channel 0 has the highest priority
    #[arg(short, long, default_value_t = 3)]
    channels: usize,

    /// Messages sent by each producer
    #[arg(short, long, default_value_t = 5)]
    messages: usize,

    /// Base send period. Lower priority producers send faster
    #[arg(short, long, default_value_t = 10)]
    period_ms: u64,

    /// Give up after this long
    #[arg(short, long, default_value_t = 1000)]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    // Default log level to "info"
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }

    pretty_env_logger::init();

    let args = Args::parse();

    let mut receivers = vec![];
    let mut producers = vec![];

    for priority in 0..args.channels {
        let (sender, receiver) = channel::<String>(Capacity::Unbounded);
        receivers.push(receiver);

        let period = Duration::from_millis(args.period_ms * (args.channels - priority) as u64);
        let messages = args.messages;

        producers.push(thread::spawn(move || -> Result<()> {
            for n in 0..messages {
                thread::sleep(period);
                sender.send(format!("channel {priority}, message {n}"))?;
            }
            Ok(())
        }));
    }

    let timeout = after(Duration::from_millis(args.timeout_ms));

    let mut inputs: Vec<&dyn Receivable> = receivers.iter().map(|r| r as &dyn Receivable).collect();
    inputs.push(&timeout);

    let mut received = vec![0usize; args.channels];

    loop {
        match select(&inputs) {
            Some(selection) if selection.is_from(&timeout) => {
                warn!("Timed out after {} ms", args.timeout_ms);
                break;
            }
            Some(selection) => {
                let index = selection.index();
                let message = selection
                    .downcast::<String>()
                    .map_err(|_| anyhow!("Unexpected value type from channel {index}"))?;

                info!("{message}");
                received[index] += 1;

                if received.iter().sum::<usize>() == args.channels * args.messages {
                    info!("All messages received");
                    break;
                }
            }
            None => {
                info!("All channels closed");
                break;
            }
        }
    }

    for producer in producers {
        producer
            .join()
            .map_err(|_| anyhow!("Producer thread panicked"))??;
    }

    for (priority, count) in received.iter().enumerate() {
        info!("Channel {priority}: {count} messages");
    }

    Ok(())
}
