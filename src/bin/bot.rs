use anyhow::Result;
use chrono::Utc;
use dotenvy::dotenv;
use log::{error, info, warn};
use serenity::async_trait;
use serenity::client::bridge::gateway::event::ShardStageUpdateEvent;
use serenity::gateway::ConnectionStage;
use serenity::model::channel::Message;
use serenity::model::event::ResumedEvent;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use std::sync::Arc;

use courier::core::Config;
use courier::features::commands::parse_schedule_command;
use courier::features::scheduler::{DeliverySweeper, MessageStore, SweepPolicy};
use courier::transport::{ConnectionState, DiscordTransport};

struct Handler {
    store: Arc<MessageStore>,
    connection: ConnectionState,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(parsed) = parse_schedule_command(&msg.content, Utc::now()) else {
            return;
        };

        let reply = match parsed {
            Ok(message) => {
                let confirmation = format!(
                    "✅ Message scheduled for {}",
                    message.send_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
                self.store.enqueue(message);
                confirmation
            }
            Err(e) => {
                warn!("Rejected scheduler command from {}: {e}", msg.author.name);
                e.user_reply().to_string()
            }
        };

        if let Err(why) = msg.channel_id.say(&ctx.http, reply).await {
            error!("Failed to reply to scheduler command: {why}");
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.connection.set_connected(true);
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🤖 Bot ID: {}", ready.user.id);
    }

    async fn resume(&self, _ctx: Context, _resume: ResumedEvent) {
        self.connection.set_connected(true);
        info!("🔗 Gateway session resumed");
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        let connected = matches!(event.new, ConnectionStage::Connected);
        self.connection.set_connected(connected);
        if !connected {
            warn!(
                "Gateway connection lost (stage: {:?}) - scheduled deliveries deferred",
                event.new
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Courier Discord Bot...");

    let store = Arc::new(MessageStore::new());
    let connection = ConnectionState::new();

    let handler = Handler {
        store: store.clone(),
        connection: connection.clone(),
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    // Start the delivery sweeper
    let transport = Arc::new(DiscordTransport::new(
        client.cache_and_http.http.clone(),
        connection,
    ));
    let sweeper = DeliverySweeper::new(
        store,
        transport,
        SweepPolicy {
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
        },
    );
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        sweeper.run(sweep_interval).await;
    });

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
