use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use tracing_subscriber::EnvFilter;

use openrouter_pipe_sdk::prelude::*;

/**
 * \brief CLI 程序入口：作为宿主调用 OpenRouter 适配器。
 */
#[derive(Parser, Debug)]
#[command(name = "openrouter-pipe", version, about = "OpenRouter pipe for chat hosts")]
struct Cli {
    #[command(flatten)]
    options: PipeOptions,

    #[command(subcommand)]
    command: Commands,
}

/**
 * \brief 与宿主配置项一一对应，可由环境变量提供。
 */
#[derive(Args, Debug)]
struct PipeOptions {
    #[arg(long, env = "OPENROUTER_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,
    /** \brief 以空格分隔的允许模型列表 */
    #[arg(long, env = "ALLOWED_MODELS", default_value = "")]
    allowed_models: String,
    #[arg(long, env = "DEFAULT_MODEL", default_value = "openai/gpt-3.5-turbo")]
    default_model: String,
    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    base_url: String,
    /** \brief 同时写入 logs/openrouter-pipe.log */
    #[arg(long, default_value_t = false)]
    telemetry: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 列出可选模型。
     */
    Models,

    /**
     * \brief 发送一条用户消息并显示模型回复。
     */
    Chat {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        system: Option<String>,
        #[arg(long, default_value_t = false)]
        stream: bool,
        /** \brief Provider 路由配置（JSON） */
        #[arg(long)]
        provider: Option<String>,
    },

    /**
     * \brief 启动本地 HTTP 服务供宿主调用。
     */
    Serve {
        #[arg(long, default_value = "127.0.0.1:5180")]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    telemetry::set_enabled(cli.options.telemetry);

    let valves = Valves {
        openrouter_api_key: cli.options.api_key,
        allowed_models: cli.options.allowed_models,
        default_model: cli.options.default_model,
    };
    let config = PipeConfig::from_valves(valves).with_base_url(cli.options.base_url);
    let pipe = OpenRouterPipe::new(config);

    match cli.command {
        Commands::Models => {
            for model in pipe.list_models().await {
                println!("{}\t{}", model.id, model.name);
            }
        }
        Commands::Chat {
            prompt,
            model,
            system,
            stream,
            provider,
        } => {
            let mut messages = Vec::new();
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(prompt));

            let mut request = ChatRequest::new(messages).streaming(stream);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            if let Some(raw) = provider {
                let routing = serde_json::from_str(&raw).context("parse --provider json failed")?;
                request = request.with_provider(routing);
            }

            match pipe.chat(request).await {
                ChatResponse::Text(text) => println!("{}", text),
                ChatResponse::Stream(mut deltas) => {
                    use std::io::Write;
                    while let Some(delta) = deltas.next().await {
                        print!("{}", delta);
                        std::io::stdout().flush().ok();
                    }
                    println!();
                }
            }
        }
        Commands::Serve { addr } => {
            println!("Server listening on http://{}", addr);
            server::run(&addr, Arc::new(pipe)).await?;
        }
    }

    Ok(())
}
