//! # runcell-dev
//!
//! 解析宿主机设备并生成容器的设备配置

use anyhow::Result;
use clap::{Parser, Subcommand};
use slog::{Drain, Logger, o};

mod devices_cmd;

/// runcell-dev - 容器设备解析工具
#[derive(Parser)]
#[command(name = "runcell-dev")]
#[command(about = "容器设备解析工具", long_about = None)]
struct Cli {
    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// 设备来源选项，两个子命令共用
#[derive(clap::Args, Debug)]
struct DeviceArgs {
    /// 设备映射 HOST[:CONTAINER][:PERMISSIONS]，可重复
    #[arg(short, long = "device")]
    devices: Vec<String>,

    /// JSON 格式的设备配置文件
    #[arg(short, long)]
    config: Option<String>,

    /// 容器分配了控制终端
    #[arg(short, long)]
    tty: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 解析设备并以 JSON 输出合并后的设备与 cgroup 规则
    Resolve {
        #[command(flatten)]
        args: DeviceArgs,

        /// 不合并默认设备列表
        #[arg(long)]
        no_defaults: bool,
    },

    /// 解析设备并写入 bundle 的 config.json
    Apply {
        #[command(flatten)]
        args: DeviceArgs,

        /// Bundle 目录
        #[arg(short, long)]
        bundle: String,
    },
}

fn setup_logger(verbose: bool) -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    let level = if verbose {
        slog::Level::Debug
    } else {
        slog::Level::Info
    };

    Logger::root(
        drain.filter_level(level).fuse(),
        o!("version" => env!("CARGO_PKG_VERSION")),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logger = setup_logger(cli.verbose);
    let _guard = slog_scope::set_global_logger(logger.clone());

    slog::debug!(logger, "runcell-dev starting"; "command" => format!("{:?}", cli.command));

    devices_cmd::handle_command(cli.command, &logger).await?;

    slog::debug!(logger, "Command completed successfully");

    Ok(())
}
