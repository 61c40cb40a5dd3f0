use indicatif::{ProgressBar, ProgressStyle};
use infra_assist_core::Assistant;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const PROMPT: &str = "Ask your IT infrastructure question (or 'q' to quit): ";

fn is_quit(input: &str) -> bool {
    ["q", "quit", "exit"]
        .iter()
        .any(|sentinel| input.eq_ignore_ascii_case(sentinel))
}

/// Spinner on stderr while the model works; hidden when stderr is not a terminal.
fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Question/answer loop until a quit word or end of input. A failed question
/// prints the error and the loop carries on.
pub async fn run<R, W>(assistant: &Assistant, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    loop {
        output
            .write_all(format!("\n{}\n{PROMPT}", "-".repeat(100)).as_bytes())
            .await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            break;
        };

        let question = line.trim();
        if is_quit(question) {
            output.write_all(b"\nExiting the Q&A system. Goodbye!\n").await?;
            break;
        }
        if question.is_empty() {
            output.write_all(b"\nPlease enter a valid question.\n").await?;
            continue;
        }

        let spinner = thinking_spinner();
        let result = assistant.ask(question).await;
        spinner.finish_and_clear();

        let reply = match result {
            Ok(answer) => format!("\nAI Response:\n{}\n{answer}\n{}\n", "~".repeat(15), "~".repeat(100)),
            Err(error) => format!(
                "\nError processing your question: {error}\nPlease try again or rephrase your question.\n"
            ),
        };
        output.write_all(reply.as_bytes()).await?;
    }

    output.flush().await
}
