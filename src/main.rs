//! Hive 命令行入口
//!
//! `hive [question...]`：运行一个任务；不带参数时依次运行三个演示问题（并发执行，按顺序输出）。

use anyhow::Context;
use futures_util::future::join_all;
use hive::{create_agent, observability};

const DEMO_TASKS: [&str; 3] = [
    "What work order is scheduled today? Tell me details and how to clean it.",
    "Provide details of work order WO1",
    "How do I clean product PROD-77881?",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let agent = create_agent(None).context("Failed to create agent")?;

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let tasks: Vec<String> = if question.trim().is_empty() {
        DEMO_TASKS.iter().map(|t| t.to_string()).collect()
    } else {
        vec![question]
    };

    let answers = join_all(tasks.iter().map(|t| agent.run(t, &[]))).await;

    for (task, answer) in tasks.iter().zip(answers) {
        let answer = answer.with_context(|| format!("Run failed for task: {task}"))?;
        println!("{}\n", "=".repeat(60));
        println!("{answer}\n");
    }

    Ok(())
}
