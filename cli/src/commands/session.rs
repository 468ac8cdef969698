use color_eyre::eyre::{eyre, Result};

use crate::cli::SessionCommands;
use crate::daemon::Session;
use crate::data::now_ms;

use super::{client_error, connect, format_duration_ms, format_timestamp};

pub fn run(command: Option<SessionCommands>) -> Result<()> {
    let mut client = connect()?;

    match command.unwrap_or(SessionCommands::List) {
        SessionCommands::List => {
            let sessions = client.get_sessions().map_err(client_error)?;
            if sessions.is_empty() {
                println!("No sessions recorded yet.");
                return Ok(());
            }
            print_table(&sessions);
        }
        SessionCommands::Show { id } => {
            let session = client.get_session(&id).map_err(client_error)?;
            print_details(&session);
        }
        SessionCommands::Current => match client.get_current_session().map_err(client_error)? {
            Some(session) => print_details(&session),
            None => println!("No session is open."),
        },
        SessionCommands::Start => {
            let session = client.start_session().map_err(client_error)?;
            println!("Started session {}", session.id);
        }
        SessionCommands::End { id } => {
            let id = match id {
                Some(id) => id,
                None => client
                    .get_current_session()
                    .map_err(client_error)?
                    .map(|s| s.id)
                    .ok_or_else(|| eyre!("No session is open."))?,
            };
            let session = client.end_session(&id).map_err(client_error)?;
            println!("Ended session {}", session.id);
            print_details(&session);
        }
    }

    Ok(())
}

fn print_table(sessions: &[Session]) {
    let now = now_ms();
    println!(
        "{:<36}  {:<19}  {:>12}  {:>10}  {:>10}",
        "ID", "Started", "Duration", "kWh", "Cost"
    );
    println!("{}", "-".repeat(95));
    for session in sessions {
        let marker = if session.is_open() { " *" } else { "" };
        println!(
            "{:<36}  {:<19}  {:>12}  {:>10.4}  {:>10.2}{}",
            session.id,
            format_timestamp(session.start_time),
            format_duration_ms(session.duration_ms(now)),
            session.total_kwh,
            session.total_cost,
            marker
        );
    }
    println!();
    println!("* open session (totals are filled in when it ends)");
}

fn print_details(session: &Session) {
    println!("Session:   {}", session.id);
    println!("Started:   {}", format_timestamp(session.start_time));
    match session.end_time {
        Some(end) => println!("Ended:     {}", format_timestamp(end)),
        None => println!("Ended:     (open)"),
    }
    println!("Duration:  {}", format_duration_ms(session.duration_ms(now_ms())));
    println!("Energy:    {:.4} kWh", session.total_kwh);
    println!("Cost:      {:.2}", session.total_cost);
}
