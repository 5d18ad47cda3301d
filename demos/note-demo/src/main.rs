//! # 笔记演示程序
//!
//! 解析笔记控制器，修改笔记，模拟一次作用域重建，然后输出恢复后的笔记

mod note;

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tether_common::{Key, ScopeName};
use tether_composition::{LoggingConfig, RuntimeBuilder};
use tether_config::{RuntimeConfig, RuntimeConfigLoader};
use tether_mvc::{global_runtime, Component, DispatchContext, Event};
use tracing::info;

use crate::note::{NoteController, NoteEvent};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "note-demo")]
#[command(about = "Tether 笔记演示")]
struct Args {
    /// 配置文件路径（.toml 或 .json）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 使用 JSON 格式输出日志
    #[arg(long)]
    json_logs: bool,

    /// 日志级别，覆盖配置
    #[arg(long)]
    log_level: Option<String>,

    /// 输出最终生效的配置后退出
    #[arg(long)]
    print_config: bool,

    /// 笔记标题
    #[arg(long, default_value = "购物清单")]
    title: String,

    /// 追加到笔记的行
    #[arg(long = "line", default_values = ["牛奶", "鸡蛋"])]
    lines: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut logging = LoggingConfig::from(&config.logging);
    if args.json_logs {
        logging.json_format = true;
    }
    if let Some(level) = &args.log_level {
        logging.level.clone_from(level);
    }

    let tether = note::register(RuntimeBuilder::new().with_config(config))?
        .with_logging(logging)
        .install_global(true)
        .build()?;
    info!("启动笔记演示");

    run(&args).await?;

    let report = tether.shutdown().await?;
    info!(
        "演示结束: 销毁 {} 个作用域, 丢弃 {} 个状态",
        report.scopes_destroyed, report.states_discarded
    );
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<RuntimeConfig> {
    let mut loader = RuntimeConfigLoader::new();
    if let Some(path) = &args.config {
        loader = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => loader.with_toml_file(path),
            Some("json") => loader.with_json_file(path),
            _ => return Err(anyhow!("不支持的配置文件格式: {}", path.display())),
        };
    }
    loader.load().context("加载配置失败")
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let runtime = global_runtime().ok_or_else(|| anyhow!("全局运行时未安装"))?;
    let editor = ScopeName::new("editor");
    let controller_key = Key::of::<NoteController>();
    let ui = DispatchContext::spawn("ui");

    runtime.on_scope_create(editor.clone(), None)?;
    let controller = runtime
        .resolve::<NoteController>(&editor, &controller_key)
        .await?;
    controller.events().register_on(
        |event: &Event<NoteEvent>| match event.payload() {
            NoteEvent::TitleChanged(title) => println!("[ui] 标题: {title}"),
            NoteEvent::ContentChanged { length } => println!("[ui] 内容长度: {length}"),
        },
        &ui,
    );

    controller.set_title(&args.title);
    for line in &args.lines {
        controller.append_line(line);
    }
    ui.flush().await;

    let saved = runtime.on_scope_will_destroy(&editor, true)?;
    runtime.on_scope_destroyed(&editor).await?;
    println!("作用域 {editor} 已为重建而销毁，保存了 {saved} 个模型");

    runtime.on_scope_create(editor.clone(), None)?;
    let restored = runtime
        .resolve::<NoteController>(&editor, &controller_key)
        .await?;
    let model = restored.model().snapshot();
    println!("{}", serde_json::to_string_pretty(&model)?);

    restored.release().await?;
    ui.shutdown().await;
    Ok(())
}
