//! # Stochastic Parrot
//!
//! Command line entry point. Each subcommand runs one job once: generate
//! content, publish it to Mastodon as a reply chain and print the URL of the
//! first post. Scheduling is left to cron or CI.
//!
//! ## Environment Variables
//!
//! Credentials are read from the environment (or a `.env` file) and can be
//! overridden with flags:
//! - `MASTODON_ACCESS_TOKEN` / `--mastodon-token`
//! - `OPENAI_API_KEY` / `--openai-token`
//! - `TEXT_TO_AUDIO_API_KEY` / `--text-to-audio-token`
//! - `CREATOMATIC_API_KEY` / `--creatomate-token`
//! - `DEBUG_MODE=true` / `--dry-run`
//!
//! Log levels are controlled via `RUST_LOG` and default to `info`.

use clap::{Parser, Subcommand};
use log::{error, info};

use stochastic_parrot::config::ParrotConfig;
use stochastic_parrot::creatomate::VideoTemplate;
use stochastic_parrot::jobs::{AudioJob, ChatJob, ImagesJob, JobContext, PollJob, VideoJob};
use stochastic_parrot::publisher::ChainResult;

#[derive(Parser)]
#[command(name = "parrot")]
#[command(about = "Generates content with language models and toots it to Mastodon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Mastodon access token
    #[arg(long, global = true)]
    mastodon_token: Option<String>,

    /// OpenAI API key
    #[arg(long, global = true)]
    openai_token: Option<String>,

    /// ElevenLabs API key
    #[arg(long, global = true)]
    text_to_audio_token: Option<String>,

    /// Creatomate API key
    #[arg(long, global = true)]
    creatomate_token: Option<String>,

    /// Generate content but do not publish it
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Post a generated text as a thread
    Chat {
        /// Prompt for the model, empty lets it pick
        #[arg(default_value = "")]
        prompt: String,
        /// Max tokens to pass to chat
        #[arg(long, default_value_t = 350)]
        max_tokens: u32,
        /// Reply to the longest recent local status instead of the prompt
        #[arg(long)]
        from_local: bool,
        /// Local statuses to choose from with --from-local
        #[arg(long, default_value_t = 5)]
        timeline_limit: u32,
    },
    /// Post a generated poll
    Poll {
        /// Subject of the poll
        #[arg(default_value = "")]
        topic: String,
        #[arg(long, default_value_t = 250)]
        max_tokens: u32,
        /// Poll expiration time in seconds
        #[arg(long, default_value_t = 86_400)]
        poll_expires: u64,
    },
    /// Post a generated text as speech
    Audio {
        #[arg(default_value = "")]
        prompt: String,
        #[arg(long, default_value_t = 100)]
        max_tokens: u32,
        /// ElevenLabs voice id
        #[arg(long)]
        voice: Option<String>,
        #[arg(long)]
        stability: Option<f32>,
        #[arg(long)]
        similarity_boost: Option<f32>,
    },
    /// Post generated images, prompted by the local timeline when no prompt is given
    Images {
        #[arg(default_value = "")]
        prompt: String,
        /// Image size, e.g. 512x512
        #[arg(long)]
        image_size: Option<String>,
        /// Number of images to generate
        #[arg(long)]
        num_images: Option<u32>,
        /// Local statuses to choose the prompt from
        #[arg(long, default_value_t = 5)]
        timeline_limit: u32,
    },
    /// Post a generated video
    Video {
        #[arg(default_value = "")]
        topic: String,
        #[arg(long, default_value_t = 350)]
        max_tokens: u32,
        /// happy-video, motivational-quote, five-facts or real-estate
        #[arg(long, default_value = "five-facts")]
        template: VideoTemplate,
    },
}

impl Cli {
    fn apply(&self, config: &mut ParrotConfig) {
        if let Some(token) = &self.mastodon_token {
            config.mastodon.access_token = Some(token.clone());
        }
        if let Some(token) = &self.openai_token {
            config.openai.api_key = Some(token.clone());
        }
        if let Some(token) = &self.text_to_audio_token {
            config.elevenlabs.api_key = Some(token.clone());
        }
        if let Some(token) = &self.creatomate_token {
            config.creatomate.api_key = Some(token.clone());
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Commands::Audio {
            stability,
            similarity_boost,
            ..
        } = &self.command
        {
            if let Some(stability) = stability {
                config.elevenlabs.stability = *stability;
            }
            if let Some(similarity_boost) = similarity_boost {
                config.elevenlabs.similarity_boost = *similarity_boost;
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ChainResult, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = ParrotConfig::from_env()?;
    cli.apply(&mut config);
    let context = JobContext::new(config);

    match cli.command {
        Commands::Chat {
            prompt,
            max_tokens,
            from_local,
            timeline_limit,
        } => {
            ChatJob {
                prompt,
                max_tokens,
                from_local,
                timeline_limit,
            }
            .run(&context)
            .await
        }
        Commands::Poll {
            topic,
            max_tokens,
            poll_expires,
        } => {
            PollJob {
                topic,
                max_tokens,
                expires_in: poll_expires,
            }
            .run(&context)
            .await
        }
        Commands::Audio {
            prompt,
            max_tokens,
            voice,
            ..
        } => {
            AudioJob {
                prompt,
                max_tokens,
                voice_id: voice,
            }
            .run(&context)
            .await
        }
        Commands::Images {
            prompt,
            image_size,
            num_images,
            timeline_limit,
        } => {
            ImagesJob {
                prompt,
                timeline_limit,
                count: num_images,
                size: image_size,
            }
            .run(&context)
            .await
        }
        Commands::Video {
            topic,
            max_tokens,
            template,
        } => {
            VideoJob {
                topic,
                max_tokens,
                template,
            }
            .run(&context)
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine, the environment may already be set
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    info!("🤖 Starting Stochastic Parrot...");

    let outcome = run(cli).await;
    let code = match outcome {
        Ok(result) => {
            info!("Toot posted to Mastodon: {}", result.first_post_url);
            println!("{}", result.first_post_url);
            0
        }
        Err(e) => {
            error!("Job Failed {} - {}", chrono::Utc::now().timestamp_millis(), e);
            1
        }
    };
    info!("Job complete {}", chrono::Utc::now().timestamp_millis());
    std::process::exit(code);
}
