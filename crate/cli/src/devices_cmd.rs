//! 设备命令实现

use std::path::Path;

use anyhow::{Context, Result};
use hostdev::{DeviceMapping, DeviceOpts, ResolvedDevices};
use oci_spec::runtime::Spec;
use slog::Logger;

use crate::{Commands, DeviceArgs};

/// 处理设备相关命令
pub async fn handle_command(cmd: Commands, logger: &Logger) -> Result<()> {
    match cmd {
        Commands::Resolve { args, no_defaults } => {
            let opts = build_opts(&args).await?;
            let resolved = resolve_devices(&opts, no_defaults, logger)?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Commands::Apply { args, bundle } => {
            let opts = build_opts(&args).await?;
            apply_to_bundle(&opts, Path::new(&bundle), logger)?;
        }
    }

    Ok(())
}

/// 合并配置文件与命令行中的设备映射，命令行中的映射追加在后
async fn build_opts(args: &DeviceArgs) -> Result<DeviceOpts> {
    let mut opts = match &args.config {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("无法读取设备配置: {}", path))?;
            DeviceOpts::from_json(&content)
                .with_context(|| format!("无法解析设备配置: {}", path))?
        }
        None => DeviceOpts::default(),
    };

    for d in args.devices.iter() {
        let mapping: DeviceMapping = d.parse()?;
        opts.devices.push(mapping);
    }
    opts.terminal |= args.tty;

    Ok(opts)
}

fn resolve_devices(
    opts: &DeviceOpts,
    no_defaults: bool,
    logger: &Logger,
) -> Result<ResolvedDevices> {
    let resolved = if no_defaults {
        opts.resolve()?
    } else {
        opts.gather(opts.terminal)?
    };

    slog::info!(logger, "设备解析完成";
        "devices" => resolved.devices.len(),
        "cgroup-rules" => resolved.cgroup_rules.len()
    );

    Ok(resolved)
}

/// 将设备写入 bundle 的 config.json
fn apply_to_bundle(opts: &DeviceOpts, bundle: &Path, logger: &Logger) -> Result<()> {
    let config_path = bundle.join("config.json");

    let mut spec = Spec::load(&config_path)
        .with_context(|| format!("无法加载 {}", config_path.display()))?;
    opts.apply(&mut spec)?;
    spec.save(&config_path)
        .with_context(|| format!("无法保存 config.json 到 {}", config_path.display()))?;

    slog::info!(logger, "设备配置已写入"; "config" => config_path.display().to_string());

    Ok(())
}
