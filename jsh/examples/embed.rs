//! Embed jsh as a command engine in your Rust application.
//!
//! Run:  cargo run -p jsh --example embed

use jsh::{Captured, ScriptedSource, Session, ShellResult, Sink};

fn print_capture(label: &str, out: &Captured) {
    println!("\n== {label} ==");
    println!("success: {}", out.success);
    if out.stdout.is_empty() {
        println!("stdout: <empty>");
    } else {
        print!("stdout:\n{}", out.stdout);
    }
}

#[tokio::main]
async fn main() -> ShellResult<()> {
    let workdir = std::env::temp_dir().join("jsh-embed-demo");
    std::fs::create_dir_all(&workdir)?;

    let errors = Sink::memory();
    let mut session = Session::builder()
        .cwd(&workdir)
        .env_file(workdir.join("env"))
        .env("APP_NAME", "embed-demo")
        .errors(errors.clone())
        .input(ScriptedSource::new(["echo typed into the heredoc", "END"]))
        .build()?;

    println!("jsh embedded demo in {}", workdir.display());

    let out = session.execute_capture("echo $APP_NAME").await?;
    print_capture("environment from builder", &out);

    let out = session.execute_capture("x=42 ; echo x is $x").await?;
    print_capture("variables", &out);

    let out = session
        .execute_capture("true && echo ran && false && echo skipped")
        .await?;
    print_capture("logical and", &out);

    session
        .execute("echo echo first > script.txt ; echo echo second >> script.txt")
        .await?;
    let out = session.execute_capture("jsh < script.txt").await?;
    print_capture("redirection (script.txt run by a nested shell)", &out);

    let out = session.execute_capture("echo `echo inner` outer").await?;
    print_capture("command substitution", &out);

    let out = session.execute_capture("jsh << END").await?;
    print_capture("heredoc", &out);

    let out = session.execute_capture("sleep 0.1 & --join ; ps").await?;
    print_capture("background job joined, then ps", &out);

    let out = session.execute_capture("unknown-command").await?;
    print_capture("unknown command", &out);
    print!("diagnostics:\n{}", errors.contents().unwrap_or_default());

    session.shutdown().await;
    Ok(())
}
