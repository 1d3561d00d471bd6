// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io::{self, Write},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use snafu::{ResultExt, Whatever};
use spool_common_telemetry::{LogFormat, LoggingOptions, init_global_logging, set_panic_hook};
use spool_storage_queue::{DurableQueue, FileQueue, QueueBuilder, StringCodec};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "spool",
about = "Inspect and manipulate durable FIFO queues",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION,
long_version = build_info::LONG_VERSION)]
struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Clone, Args)]
struct QueueArgs {
    /// Directory holding the queue's storage file
    #[arg(long, global = true, default_value = "./queue_data")]
    dir: PathBuf,

    /// Queue name; also the storage file name
    #[arg(long, global = true, default_value = "default")]
    name: String,

    /// Log filter, e.g. "info" or "spool_storage_queue=debug"
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
}

impl QueueArgs {
    fn logging_options(&self) -> LoggingOptions {
        LoggingOptions::builder()
            .level(self.log_level.clone())
            .log_format(self.log_format.into())
            .use_stderr(true)
            .build()
    }

    fn open(&self) -> Result<DurableQueue<String>, Whatever> {
        QueueBuilder::new()
            .name(&self.name)
            .path(&self.dir)
            .codec(StringCodec)
            .build()
            .with_whatever_context(|_| {
                format!("failed to open queue '{}' in {}", self.name, self.dir.display())
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Push(PushArgs),
    Pop(PopArgs),
    Peek(PeekArgs),
    Size(SizeArgs),
    List(ListArgs),
    Clear(ClearArgs),
}

impl Commands {
    fn run(&self, queue: &DurableQueue<String>, out: &mut impl Write) -> Result<(), Whatever> {
        match self {
            Self::Push(args) => args.run(queue, out),
            Self::Pop(args) => args.run(queue, out),
            Self::Peek(args) => args.run(queue, out),
            Self::Size(args) => args.run(queue, out),
            Self::List(args) => args.run(queue, out),
            Self::Clear(args) => args.run(queue, out),
        }
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Append values to the tail of the queue and print the key assigned to each.
Examples:

spool push first second third

")]
struct PushArgs {
    #[arg(required = true)]
    values: Vec<String>,
}

impl PushArgs {
    fn run(&self, queue: &DurableQueue<String>, out: &mut impl Write) -> Result<(), Whatever> {
        for value in &self.values {
            let key = queue.enqueue(value).whatever_context("failed to enqueue")?;
            writeln!(out, "{key}").whatever_context("failed to write output")?;
        }
        queue.flush().whatever_context("failed to flush queue")
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Remove values from the head of the queue and print them.
Examples:

spool pop
spool pop -n 10

")]
struct PopArgs {
    /// Maximum number of values to remove
    #[arg(short = 'n', long = "count", default_value_t = 1)]
    count: usize,
}

impl PopArgs {
    fn run(&self, queue: &DurableQueue<String>, out: &mut impl Write) -> Result<(), Whatever> {
        for _ in 0..self.count {
            let Some(value) = queue.dequeue().whatever_context("failed to dequeue")? else {
                break;
            };
            writeln!(out, "{value}").whatever_context("failed to write output")?;
        }
        queue.flush().whatever_context("failed to flush queue")
    }
}

/// Print the head value without removing it
#[derive(Debug, Clone, Args)]
struct PeekArgs {}

impl PeekArgs {
    fn run(&self, queue: &DurableQueue<String>, out: &mut impl Write) -> Result<(), Whatever> {
        if let Some(value) = queue.peek().whatever_context("failed to peek")? {
            writeln!(out, "{value}").whatever_context("failed to write output")?;
        }
        Ok(())
    }
}

/// Print the number of queued values
#[derive(Debug, Clone, Args)]
struct SizeArgs {}

impl SizeArgs {
    fn run(&self, queue: &DurableQueue<String>, out: &mut impl Write) -> Result<(), Whatever> {
        let len = queue.len().whatever_context("failed to read queue size")?;
        writeln!(out, "{len}").whatever_context("failed to write output")
    }
}

/// Print every queued value, head first
#[derive(Debug, Clone, Args)]
struct ListArgs {}

impl ListArgs {
    fn run(&self, queue: &DurableQueue<String>, out: &mut impl Write) -> Result<(), Whatever> {
        for value in queue.iter().whatever_context("failed to iterate queue")? {
            let value = value.whatever_context("failed to read queue entry")?;
            writeln!(out, "{value}").whatever_context("failed to write output")?;
        }
        Ok(())
    }
}

/// Remove every value and restart key numbering
#[derive(Debug, Clone, Args)]
struct ClearArgs {}

impl ClearArgs {
    fn run(&self, queue: &DurableQueue<String>, _out: &mut impl Write) -> Result<(), Whatever> {
        queue.clear().whatever_context("failed to clear queue")?;
        queue.flush().whatever_context("failed to flush queue")
    }
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();

    set_panic_hook();
    let _guards = init_global_logging("spool", &cli.queue.logging_options())
        .whatever_context("failed to initialize logging")?;

    let queue = cli.queue.open()?;
    let result = cli.commands.run(&queue, &mut io::stdout().lock());
    queue.close().whatever_context("failed to close queue")?;
    result
}
