use std::io::{self, Write};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use huddle::client::RetryClient;
use huddle::model::WeekTime;
use huddle::wire::{OP_CALLBACK, Reply, Request};

#[derive(Parser)]
#[command(
    name = "huddle-client",
    about = "Interactive client for the huddle reservation server"
)]
struct Cli {
    /// Server address as host:port
    #[arg(long = "serverAddr", default_value = "localhost:2222")]
    server_addr: String,

    /// Per-attempt receive deadline in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Randomly discard received replies to exercise the retry loop
    #[arg(long = "packetDemo")]
    packet_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "huddle=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut client = RetryClient::connect(
        cli.server_addr.as_str(),
        Duration::from_secs(cli.timeout),
        cli.packet_demo,
    )
    .await
    .with_context(|| format!("failed to dial {}", cli.server_addr))?;

    loop {
        println!("\nAvailable commands:");
        println!("1. query - Query facility availability");
        println!("2. book - Book a facility");
        println!("3. change - Change an existing booking");
        println!("4. monitor - Monitor facility availability");
        println!("5. cancel - Cancel a booking");
        println!("6. add-participant - Add participant to a booking");
        println!("7. exit - Exit the client");

        match prompt("\nEnter command: ")?.as_str() {
            "1" | "query" => handle_query(&mut client).await,
            "2" | "book" => handle_book(&mut client).await,
            "3" | "change" => handle_change(&mut client).await,
            "4" | "monitor" => handle_monitor(&mut client).await,
            "5" | "cancel" => handle_cancel(&mut client).await,
            "6" | "add-participant" => handle_add_participant(&mut client).await,
            "7" | "exit" => {
                println!("Exiting client.");
                return Ok(());
            }
            _ => println!("Unknown command. Please try again."),
        }
    }
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_parsed<T: std::str::FromStr>(label: &str) -> Option<T> {
    let line = prompt(label).ok()?;
    match line.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            println!("Error: could not parse '{line}'");
            None
        }
    }
}

fn prompt_week_time(what: &str) -> Option<WeekTime> {
    let day = prompt_parsed(&format!("Enter {what} day (0=Monday..6=Sunday): "))?;
    let hour = prompt_parsed(&format!("Enter {what} hour (0-23): "))?;
    let min = prompt_parsed(&format!("Enter {what} minute (0-59): "))?;
    match WeekTime::new(day, hour, min) {
        Some(wt) => Some(wt),
        None => {
            println!("Error: time out of range");
            None
        }
    }
}

async fn send(client: &mut RetryClient, request: Request) -> Option<Reply> {
    match client.call(&request).await {
        Ok(reply) => Some(reply),
        Err(e) => {
            println!("Error: {e}");
            None
        }
    }
}

async fn handle_query(client: &mut RetryClient) {
    let Ok(facility) = prompt("Enter facility name: ") else {
        return;
    };
    let Ok(days_line) = prompt("Enter days to query (e.g. 0,1,2): ") else {
        return;
    };
    let mut days = Vec::new();
    for part in days_line.split([',', ' ']).filter(|s| !s.is_empty()) {
        match part.parse::<u8>() {
            Ok(d) => days.push(d),
            Err(_) => {
                println!("Error: invalid day '{part}'");
                return;
            }
        }
    }

    let Some(reply) = send(client, Request::Query { facility, days }).await else {
        return;
    };
    println!("\nQuery Result:");
    if reply.status == 0 {
        println!("{}", reply.data);
    } else {
        println!("Error: {}", reply.data);
    }
}

async fn handle_book(client: &mut RetryClient) {
    let Ok(facility) = prompt("Enter facility name: ") else {
        return;
    };
    let Some(start) = prompt_week_time("start") else {
        return;
    };
    let Some(end) = prompt_week_time("end") else {
        return;
    };

    let Some(reply) = send(
        client,
        Request::Book {
            facility,
            start,
            end,
        },
    )
    .await
    else {
        return;
    };
    if reply.status == 0 {
        println!("\nBooking successful!");
    } else {
        println!("\nBooking failed!");
    }
    println!("{}", reply.data);
}

async fn handle_change(client: &mut RetryClient) {
    let Ok(confirmation_id) = prompt("Enter Confirmation ID: ") else {
        return;
    };
    let Some(offset_min) =
        prompt_parsed::<i32>("Enter offset in minutes (negative to move earlier): ")
    else {
        return;
    };

    let Some(reply) = send(
        client,
        Request::Change {
            confirmation_id,
            offset_min,
        },
    )
    .await
    else {
        return;
    };
    if reply.status == 0 {
        println!("\nBooking changed successfully!");
    } else {
        println!("\nFailed to change booking!");
    }
    println!("{}", reply.data);
}

async fn handle_monitor(client: &mut RetryClient) {
    let Ok(facility) = prompt("Enter facility name: ") else {
        return;
    };
    let Some(period_secs) = prompt_parsed::<u32>("Enter duration in seconds: ") else {
        return;
    };

    let Some(reply) = send(
        client,
        Request::Monitor {
            facility,
            period_secs,
        },
    )
    .await
    else {
        return;
    };
    if reply.status != 0 {
        println!("\nFailed to start monitoring!");
        println!("{}", reply.data);
        return;
    }
    println!("\nMonitoring started successfully!");
    println!("{}", reply.data);

    monitor_updates(client).await;
}

/// Poll for callback frames until the user presses Enter.
async fn monitor_updates(client: &RetryClient) {
    println!("\nWaiting for updates (press Enter to stop)...");

    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        let _ = tx.send(());
    });
    let mut stopped = rx;

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            frame = client.recv_frame(Duration::from_millis(500)) => match frame {
                Ok(Some(reply)) if reply.opcode == OP_CALLBACK => {
                    println!("\n{}", reply.data);
                }
                Ok(_) => {}
                Err(e) => {
                    println!("Error reading callback: {e}");
                    break;
                }
            },
        }
    }
}

async fn handle_cancel(client: &mut RetryClient) {
    let Ok(confirmation_id) = prompt("Enter Confirmation ID: ") else {
        return;
    };

    let Some(reply) = send(client, Request::Cancel { confirmation_id }).await else {
        return;
    };
    if reply.status == 0 {
        println!("\nBooking canceled successfully!");
    } else {
        println!("\nFailed to cancel booking!");
    }
    println!("{}", reply.data);
}

async fn handle_add_participant(client: &mut RetryClient) {
    let Ok(confirmation_id) = prompt("Enter Booking Confirmation ID: ") else {
        return;
    };
    let Ok(participant) = prompt("Enter Participant Name: ") else {
        return;
    };

    let Some(reply) = send(
        client,
        Request::AddParticipant {
            confirmation_id,
            participant,
        },
    )
    .await
    else {
        return;
    };
    if reply.status == 0 {
        println!("\nParticipant added successfully!");
    } else {
        println!("\nFailed to add participant!");
    }
    println!("{}", reply.data);
}
