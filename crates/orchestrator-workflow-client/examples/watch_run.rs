use std::path::PathBuf;

use orchestrator_workflow_client::prelude::*;
use orchestrator_workflow_client::init_observability;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), WorkflowClientError> {
    let _ = dotenvy::dotenv();
    init_observability();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let client = WorkflowClient::from_env()?;

    let mut run = client.create_run(&cwd).await?;
    println!("run {}", run.run_id());
    run.watch()?;
    run.start_workflow(&cwd).await?;

    while let Some(event) = run.next_event().await {
        match event.as_step() {
            WorkflowStep::Thinking { message } => {
                println!("thinking: {}", message.unwrap_or_default())
            }
            WorkflowStep::Clarification { prompt } => {
                println!("needs input: {}", prompt.unwrap_or_default())
            }
            WorkflowStep::Finished { result } => match result {
                Some(result) => println!("finished: {result}"),
                None => println!("finished"),
            },
            WorkflowStep::Other { step } => {
                println!("{}: {}", step.unwrap_or("event"), event.payload)
            }
        }
    }

    match run.finish().await? {
        WatchOutcome::Finished => {}
        outcome => eprintln!("run ended without finishing: {outcome:?}"),
    }
    Ok(())
}
