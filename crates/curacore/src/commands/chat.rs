//! Chat command - a triage conversation in the terminal.

use anyhow::Result;
use clap::Args;
use console::{Style, Term, style};
use curacore_triage::{DoctorSummarizer, SessionManager, TriageReply, TriageStep};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use super::Context;
use crate::services::Services;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Session id (a new one is generated if omitted)
    #[arg(short, long)]
    pub session: Option<String>,
}

/// Run the chat command.
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let services = Services::build(ctx.config())?;
    // Keep finished sessions so /summary still works after the analysis.
    let (sessions, _cache) = services.session_manager(true);
    let session_id = args
        .session
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut repl = Repl::new(sessions, services.summarizer(), session_id, ctx.verbose)?;
    repl.run().await
}

/// Control flow for the REPL.
enum ControlFlow {
    Continue,
    Exit,
}

struct Repl {
    sessions: SessionManager,
    summarizer: DoctorSummarizer,
    session_id: String,
    editor: Editor<(), DefaultHistory>,
    term: Term,
    verbose: bool,
}

impl Repl {
    fn new(
        sessions: SessionManager,
        summarizer: DoctorSummarizer,
        session_id: String,
        verbose: bool,
    ) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        Ok(Self {
            sessions,
            summarizer,
            session_id,
            editor: Editor::with_config(config)?,
            term: Term::stdout(),
            verbose,
        })
    }

    async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = self.format_prompt();

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                self.print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    match self.sessions.process(&self.session_id, line).await {
                        Ok(reply) => self.print_reply(&reply),
                        Err(e) => self.print_error(&e.to_string()),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    self.print_dim("(Interrupted - type /quit to exit)");
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    self.print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        self.print_dim("Take care.");
        Ok(())
    }

    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let cmd = input[1..].split_whitespace().next().unwrap_or("");

        match cmd {
            "quit" | "q" | "exit" => return Ok(ControlFlow::Exit),
            "help" | "h" | "?" => self.print_help(),
            "clear" | "cls" => self.term.clear_screen()?,
            "reset" | "new" => {
                self.sessions.reset(&self.session_id).await?;
                self.print_dim("Started over. Describe your symptoms.");
            }
            "session" => println!("Current session: {}", self.session_id),
            "summary" => self.print_summary().await,
            "" => self.print_dim("Type /help for available commands"),
            _ => {
                self.print_error(&format!("Unknown command: /{}", cmd));
                self.print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_reply(&self, reply: &TriageReply) {
        println!();
        let text = match reply.step {
            TriageStep::Terminated => style(reply.response_text.as_str()).red().bold(),
            _ => style(reply.response_text.as_str()),
        };
        println!("{}", text);
        if self.verbose {
            self.print_dim(&format!("[{}]", reply.step));
        }
        if reply.step.is_terminal() {
            self.print_dim("Use /summary for a clinician summary or /reset to start over.");
        }
        println!();
    }

    async fn print_summary(&self) {
        match self.sessions.snapshot(&self.session_id).await {
            Some(session) => {
                let summary = self.summarizer.summarize(&session).await;
                println!();
                println!("{}", style("Clinician Summary").bold());
                println!("{}", Style::new().dim().apply_to("─".repeat(40)));
                println!("{}", summary);
                println!();
            }
            None => self.print_dim("Nothing to summarize yet."),
        }
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("CuraCore Triage").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("{}", dim.apply_to("Not a diagnosis. In an emergency call your local emergency number."));
        println!("{}", dim.apply_to("Use /help for commands, Ctrl+D to exit."));
        println!();
        println!("Hello. What symptoms are you experiencing today?");
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Start the triage over", style("/reset").cyan());
        println!("  {}  - Show current session ID", style("/session").cyan());
        println!("  {}  - Summarize the conversation for a clinician", style("/summary").cyan());
        println!();
    }

    fn format_prompt(&self) -> String {
        format!("{} ", style("you>").cyan().bold())
    }

    fn print_dim(&self, msg: &str) {
        println!("{}", Style::new().dim().apply_to(msg));
    }

    fn print_error(&self, msg: &str) {
        println!("{} {}", Style::new().red().apply_to("Error:"), msg);
    }
}
