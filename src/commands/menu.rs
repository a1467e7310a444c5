//! Interactive menu front-end.
//!
//! Reads the operator's choices with `rustyline` and drives the operations in
//! [`super::logic`]. Input errors are reported on screen and never touch the
//! daemon, which keeps running in the background.

use std::time::Duration;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::db::{self, Database};
use crate::error::AppError;
use crate::firewall::FirewallGateway;

use super::logic::{build_status_rows, parse_limit, parse_port, register_port, remove_port, Pager};
use super::service::install_service;
use super::table::render_table;

/// Pause after a one-shot screen so its message can be read.
const MESSAGE_PAUSE: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainChoice {
    InstallService,
    AddPort,
    DeletePort,
    Dashboard,
    Exit,
}

impl MainChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::InstallService),
            "2" => Some(Self::AddPort),
            "3" => Some(Self::DeletePort),
            "4" => Some(Self::Dashboard),
            "5" => Some(Self::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardAction {
    Refresh,
    NextPage,
    PreviousPage,
    Exit,
}

impl DashboardAction {
    /// Page navigation is only offered when there is more than one page.
    pub fn parse(input: &str, page_count: usize) -> Option<Self> {
        let paged = page_count > 1;
        match input.trim().to_ascii_uppercase().as_str() {
            "1" => Some(Self::Refresh),
            "2" => Some(Self::Exit),
            "N" if paged => Some(Self::NextPage),
            "P" if paged => Some(Self::PreviousPage),
            _ => None,
        }
    }
}

pub struct Menu<'a> {
    config: &'a Config,
    db: &'a Database,
    firewall: &'a dyn FirewallGateway,
    editor: DefaultEditor,
}

impl<'a> Menu<'a> {
    pub fn new(
        config: &'a Config,
        db: &'a Database,
        firewall: &'a dyn FirewallGateway,
    ) -> Result<Self, AppError> {
        Ok(Self {
            config,
            db,
            firewall,
            editor: DefaultEditor::new()?,
        })
    }

    /// Main loop. Returns when the operator exits or presses Ctrl-C/Ctrl-D.
    pub fn run(&mut self) -> Result<(), AppError> {
        loop {
            header();
            println!(
                "{}",
                "
  1. Install/Update Background Service   (run this first)
  2. Add New Port                         (set limits)
  3. Delete/Reset Port                    (stop monitoring)
  4. Open Live Dashboard                  (check status)
  5. Exit
"
                .blue()
            );

            let Some(input) = self.prompt("Selection: ")? else {
                println!("\n{}", "Exiting...".yellow());
                return Ok(());
            };

            let outcome = match MainChoice::parse(&input) {
                Some(MainChoice::InstallService) => self.install_service_screen(),
                Some(MainChoice::AddPort) => self.add_port_screen(),
                Some(MainChoice::DeletePort) => self.delete_port_screen(),
                Some(MainChoice::Dashboard) => self.dashboard_screen(),
                Some(MainChoice::Exit) => {
                    println!(
                        "{}",
                        "Goodbye! Monitoring continues in background...".yellow()
                    );
                    return Ok(());
                }
                None => {
                    println!(
                        "{}",
                        "Invalid selection. Please choose 1, 2, 3, 4, or 5.".red()
                    );
                    pause();
                    Ok(())
                }
            };

            if let Err(e) = outcome {
                println!("{} {e}", "Error:".red().bold());
                pause();
            }
        }
    }

    /// Read one line; `None` on Ctrl-C or Ctrl-D.
    fn prompt(&mut self, label: &str) -> Result<Option<String>, AppError> {
        match self.editor.readline(label) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn install_service_screen(&mut self) -> Result<(), AppError> {
        header();
        let unit = install_service(self.config)?;
        println!(
            "{}\nUnit: {}\nMonitoring runs in background now.",
            "Service Installed & Started Successfully!".green().bold(),
            unit.display()
        );
        self.prompt("\nPress Enter to return")?;
        Ok(())
    }

    fn add_port_screen(&mut self) -> Result<(), AppError> {
        header();
        println!("{}", "Add New Port to Monitor".yellow().bold());

        let Some(port) = self.prompt("Enter Port Number: ")? else {
            return Ok(());
        };
        let port = parse_port(&port)?;
        let Some(time) = self.prompt("Time Limit (mins, 0 for none): ")? else {
            return Ok(());
        };
        let time_limit = parse_limit(&time)?;
        let Some(data) = self.prompt("Data Limit (MB, 0 for none): ")? else {
            return Ok(());
        };
        let data_limit = parse_limit(&data)?;

        register_port(
            self.db,
            self.firewall,
            port,
            time_limit,
            data_limit,
            db::chrono_timestamp(),
        )?;
        println!(
            "\n{}",
            format!("Port {port} is now being monitored!").green().bold()
        );
        pause();
        Ok(())
    }

    fn delete_port_screen(&mut self) -> Result<(), AppError> {
        header();
        self.db.ensure_schema()?;
        let mut ports: Vec<u16> = self.db.list_all()?.iter().map(|p| p.port).collect();
        if ports.is_empty() {
            println!("{}", "No ports found in database.".yellow());
            pause();
            return Ok(());
        }
        ports.sort_unstable();
        let listed: Vec<String> = ports.iter().map(u16::to_string).collect();
        println!("{} {}", "Monitored Ports:".bold(), listed.join(", "));

        let Some(input) = self.prompt("Enter Port to Stop Monitoring: ")? else {
            return Ok(());
        };
        let port = parse_port(&input)?;
        if remove_port(self.db, self.firewall, port)? {
            println!(
                "{}",
                format!("Port {port} removed from monitor and firewall rules cleared.")
                    .green()
                    .bold()
            );
        } else {
            println!("{}", "Port not found!".red());
        }
        pause();
        Ok(())
    }

    fn dashboard_screen(&mut self) -> Result<(), AppError> {
        self.db.ensure_schema()?;

        let mut pager = Pager::new(self.config.page_size);
        loop {
            header();
            // A transient read failure shows an empty table rather than leaving the screen.
            let ports = self.db.list_all().unwrap_or_else(|e| {
                tracing::warn!("Dashboard read failed: {e:#}");
                Vec::new()
            });
            let rows = build_status_rows(&ports, db::chrono_timestamp());
            let pages = pager.page_count(rows.len());

            println!("{}", "Monitored Ports (Detailed Stats)".cyan().bold());
            print!("{}", render_table(pager.page(&rows), true));

            println!("\n{}", "Options".yellow().bold());
            println!("  1. {}", "Refresh Data Now".green());
            if pages > 1 {
                println!(
                    "  N. {}",
                    format!("Next Page ({}/{pages})", pager.current() + 1).yellow()
                );
                println!("  P. {}", "Previous Page".yellow());
            }
            println!("  2. {}", "Exit to Main Menu".red());

            let Some(input) = self.prompt("Selection: ")? else {
                return Ok(());
            };
            match DashboardAction::parse(&input, pages) {
                Some(DashboardAction::Refresh) => {}
                Some(DashboardAction::NextPage) => pager.next(rows.len()),
                Some(DashboardAction::PreviousPage) => pager.previous(rows.len()),
                Some(DashboardAction::Exit) => return Ok(()),
                None => {
                    println!(
                        "{}",
                        "Invalid selection. Please use the options provided.".red()
                    );
                    pause();
                }
            }
        }
    }
}

fn header() {
    // Clear screen and home the cursor.
    print!("\x1B[2J\x1B[1;1H");
    println!("{}\n", "  Port Usage Quota Monitor  ".cyan().bold().reversed());
}

fn pause() {
    std::thread::sleep(MESSAGE_PAUSE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_choice_parse() {
        assert_eq!(MainChoice::parse("1"), Some(MainChoice::InstallService));
        assert_eq!(MainChoice::parse(" 2 "), Some(MainChoice::AddPort));
        assert_eq!(MainChoice::parse("3"), Some(MainChoice::DeletePort));
        assert_eq!(MainChoice::parse("4"), Some(MainChoice::Dashboard));
        assert_eq!(MainChoice::parse("5"), Some(MainChoice::Exit));
        assert_eq!(MainChoice::parse("6"), None);
        assert_eq!(MainChoice::parse(""), None);
    }

    #[test]
    fn test_dashboard_action_single_page_hides_navigation() {
        assert_eq!(DashboardAction::parse("1", 1), Some(DashboardAction::Refresh));
        assert_eq!(DashboardAction::parse("2", 1), Some(DashboardAction::Exit));
        assert_eq!(DashboardAction::parse("N", 1), None);
        assert_eq!(DashboardAction::parse("p", 0), None);
    }

    #[test]
    fn test_dashboard_action_paged_is_case_insensitive() {
        assert_eq!(DashboardAction::parse("n", 3), Some(DashboardAction::NextPage));
        assert_eq!(DashboardAction::parse("P", 3), Some(DashboardAction::PreviousPage));
        assert_eq!(DashboardAction::parse("x", 3), None);
    }
}
