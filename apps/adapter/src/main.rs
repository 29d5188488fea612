//! # Cafebot Adapter
//!
//! 机械臂适配进程：加载工位配置，连接控制器并收敛到位置模式，
//! 然后以行分隔 JSON 协议提供 `park` / `stand` / `enable` 门面。
//!
//! ```bash
//! # 常驻服务
//! STAND_NAME=bar_stand cafebot-adapter serve --address 0.0.0.0:50051
//!
//! # 单次操作
//! cafebot-adapter --stand default_stand park
//! cafebot-adapter offsets tool
//! ```

mod bootstrap;
mod server;
mod service;

use anyhow::{Context, Result, bail};
use bootstrap::Components;
use cafebot_client::OffsetSource;
use clap::{Parser, Subcommand, ValueEnum};
use server::RequestServer;
use service::{MovementsService, SimpleResponse};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 默认日志级别
const DEFAULT_LOG_FILTER: &str = "cafebot_adapter=info,cafebot_client=info,cafebot_channel=info,cafebot_config=info,cafebot_driver=info";

#[derive(Parser, Debug)]
#[command(name = "cafebot-adapter")]
#[command(about = "Robot adapter for the cafebot arm", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（JSON；扩展名为 .toml 时按 TOML 解析）
    #[arg(short, long, default_value = "config/ext_config.json")]
    config: PathBuf,

    /// 工位名
    ///
    /// 未指定时使用 default_stand
    #[arg(long, env = "STAND_NAME")]
    stand: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动请求服务
    Serve {
        /// 监听地址
        #[arg(long, default_value = "0.0.0.0:50051")]
        address: String,
    },

    /// 运动到停靠位姿
    Park,

    /// 运动到工作位姿
    Stand,

    /// 清除故障并重新使能
    Enable,

    /// 查询配置服务中的偏移配置
    Offsets {
        #[arg(value_enum)]
        kind: OffsetsKind,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OffsetsKind {
    Tool,
    Base,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let components = Components::load(&cli.config, cli.stand.as_deref())?;

    match cli.command {
        Commands::Serve { address } => serve(&components, &address),
        Commands::Park => one_shot(&components, MovementsService::park),
        Commands::Stand => one_shot(&components, MovementsService::stand),
        Commands::Enable => one_shot(&components, MovementsService::enable),
        Commands::Offsets { kind } => print_offsets(&components, kind),
    }
}

fn serve(components: &Components, address: &str) -> Result<()> {
    components.startup()?;

    let service = Arc::new(MovementsService::new(components.arm.clone()));
    let server = RequestServer::bind(address, service)?;

    let running = server.running_flag();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        running.store(false, Ordering::Release);
    })
    .context("failed to set signal handler")?;

    server.run()?;
    components.channel.close();
    info!("Adapter stopped");
    Ok(())
}

fn one_shot(
    components: &Components,
    operation: fn(&MovementsService) -> SimpleResponse,
) -> Result<()> {
    components.startup()?;
    let service = MovementsService::new(components.arm.clone());
    let response = operation(&service);
    println!("{}", serde_json::to_string(&response)?);
    if !response.success {
        bail!("{}", response.message);
    }
    Ok(())
}

fn print_offsets(components: &Components, kind: OffsetsKind) -> Result<()> {
    let output = match kind {
        OffsetsKind::Tool => {
            let profiles = components
                .offsets
                .tool_offsets()
                .context("tool offset query failed")?;
            serde_json::to_value(profiles)?
        },
        OffsetsKind::Base => {
            let offsets = components
                .offsets
                .base_offsets()
                .context("base offset query failed")?;
            serde_json::json!({
                "current": offsets.current,
                "profiles": offsets.profiles,
            })
        },
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
