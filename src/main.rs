use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use story_illustrator::utils::logging;
use story_illustrator::{App, Config, Credentials, GenerateRequest};

/// 恐怖故事 + 插图 + PDF 生成器
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动 HTTP 服务
    Serve {
        /// 监听地址，默认取配置中的 bind_addr
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// 生成一次并写出 PDF
    Generate {
        #[arg(short, long)]
        prompt: String,
        #[arg(short, long)]
        style: Option<String>,
        #[arg(long)]
        llm_api_key: Option<String>,
        #[arg(long)]
        image_api_key: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    let cli = Cli::parse();

    // 加载配置
    let config = Config::load()?;

    match cli.command {
        Command::Serve { bind } => {
            App::initialize(config, "HTTP 服务模式").serve(bind).await?;
        }
        Command::Generate {
            prompt,
            style,
            llm_api_key,
            image_api_key,
            output,
        } => {
            let request = GenerateRequest {
                prompt,
                style,
                credentials: Credentials {
                    llm_api_key,
                    image_api_key,
                },
                output,
            };
            App::initialize(config, "单次生成模式").generate(request).await?;
        }
    }

    Ok(())
}
