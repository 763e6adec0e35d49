use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};

use widgetforge_core_sdk::{
    codegen,
    config::Config,
    llm,
    models::{AIModel, BorderRadius, ButtonStyle, ConnectionMode, ModelDraft, Position, Provider},
    registry, server, session, telemetry,
};

/**
 * \brief CLI 程序入口：预设查询、请求预演、单次对话、导出脚本与本地配置服务。
 */
#[derive(Parser, Debug)]
#[command(name = "widgetforge", version, about = "Chat widget configurator and script generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 列出内置模型预设。
     */
    Presets,

    /**
     * \brief 打印将要发出的请求（不联网）。
     */
    Request {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long)]
        prompt: String,
    },

    /**
     * \brief 发送一条消息并打印回复。
     */
    Chat {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long)]
        prompt: String,
    },

    /**
     * \brief 生成嵌入脚本。
     */
    Export {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        style: StyleArgs,
        /** \brief 输出文件，缺省写到标准输出 */
        #[arg(long)]
        out: Option<PathBuf>,
        /** \brief 以 `<script>` 标签包裹 */
        #[arg(long, default_value_t = false)]
        snippet: bool,
    },

    /**
     * \brief 启动本地配置服务与实时预览页面。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5173")]
        addr: String,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    /** \brief 以预设为底，其余参数覆盖预设 */
    #[arg(long)]
    preset: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    provider: Option<Provider>,
    #[arg(long)]
    mode: Option<ConnectionMode>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
}

impl ModelArgs {
    fn into_model(self) -> Result<AIModel> {
        let base = match &self.preset {
            Some(id) => Some(
                registry::draft_from_preset(id).ok_or_else(|| anyhow!("unknown preset: {}", id))?,
            ),
            None => None,
        };
        let provider = self
            .provider
            .or(base.as_ref().map(|d| d.provider))
            .context("--provider or --preset is required")?;
        let draft = ModelDraft {
            name: self
                .name
                .or_else(|| base.as_ref().map(|d| d.name.clone()))
                .unwrap_or_else(|| "Custom model".to_string()),
            provider,
            endpoint: self
                .endpoint
                .or_else(|| base.as_ref().map(|d| d.endpoint.clone()))
                .unwrap_or_default(),
            api_key: self.api_key.unwrap_or_default(),
            model: self
                .model
                .or_else(|| base.as_ref().map(|d| d.model.clone()))
                .unwrap_or_default(),
            mode: self
                .mode
                .or(base.as_ref().map(|d| d.mode))
                .unwrap_or_default(),
        };
        let draft = registry::validate_draft(draft).context("invalid model configuration")?;
        Ok(draft.into_model("cli".to_string()))
    }
}

#[derive(Args, Debug)]
struct StyleArgs {
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    text_color: Option<String>,
    #[arg(long)]
    radius: Option<BorderRadius>,
    #[arg(long)]
    position: Option<Position>,
}

impl StyleArgs {
    fn into_style(self) -> Result<ButtonStyle> {
        let defaults = ButtonStyle::default();
        let style = ButtonStyle {
            label: self.label.unwrap_or(defaults.label),
            background: self.background.unwrap_or(defaults.background),
            text_color: self.text_color.unwrap_or(defaults.text_color),
            radius: self.radius.unwrap_or(defaults.radius),
            position: self.position.unwrap_or(defaults.position),
        };
        session::validate_style(style).context("invalid style")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env();
    config.apply_telemetry();

    match cli.command {
        Commands::Presets => {
            for p in registry::presets() {
                println!(
                    "{:<14} {:<30} {:<18} {:<7} {}  ({})",
                    p.id, p.name, p.provider, p.mode, p.model, p.endpoint
                );
            }
        }
        Commands::Request { model, prompt } => {
            let model = model.into_model()?;
            let spec = llm::build_request(&model, &prompt);
            println!("{}", serde_json::to_string_pretty(&spec)?);
        }
        Commands::Chat { model, prompt } => {
            let model = model.into_model()?;
            telemetry::log_event(
                "cli.chat",
                &format!(
                    "model={} provider={} mode={} prompt_len={}",
                    model.name,
                    model.provider,
                    model.mode,
                    prompt.len()
                ),
            );
            let reply = llm::send(&reqwest::Client::new(), &model, &prompt).await;
            println!("{}", reply);
        }
        Commands::Export {
            model,
            style,
            out,
            snippet,
        } => {
            let model = model.into_model()?;
            let style = style.into_style()?;
            let text = if snippet {
                codegen::embed_snippet(&style, &model)?
            } else {
                codegen::generate_script(&style, &model)?
            };
            if model.mode == ConnectionMode::Direct && !model.api_key.is_empty() {
                eprintln!("warning: direct mode embeds the API key in the generated script");
            }
            match out {
                Some(path) => {
                    std::fs::write(&path, text)
                        .with_context(|| format!("write {} failed", path.display()))?;
                    println!("Wrote {} ({} mode)", path.display(), model.mode);
                }
                None => println!("{}", text),
            }
        }
        Commands::Serve { addr } => {
            server::run(&addr, config).await?;
        }
    }

    Ok(())
}
