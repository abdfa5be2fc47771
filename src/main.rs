use std::error::Error;
use std::fs;
use std::sync::Arc;

use clap::Parser;

use oldworld::config::{Cli, Command, Config, ProfileCommand, WatchCommand};
use oldworld::conversation::MessageRecord;
use oldworld::identity::{Display, Session};
use oldworld::notification::NotificationRecord;
use oldworld::posts::{FeedFilter, NewPost, Post, PostSource};
use oldworld::social::Social;
use oldworld::storage::{db_path, SqliteStore};
use oldworld::sync::{NotificationFeed, SyncScheduler};

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    oldworld::logging::init();

    let config = Config::from_cli_and_env(&cli)?;
    fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(SqliteStore::open(&db_path(&config.data_dir))?);
    let social = Social::new(store);
    social.posts.seed_if_empty()?;

    let session = Session::current(social.store.as_ref())?;
    let me = config.active_identity(session.as_ref());

    match cli.command {
        Command::Login { identity, token } => {
            match Session::login(social.store.as_ref(), &identity, &token)? {
                Some(s) => println!("logged in as {}", s.identity),
                None => return Err("identity must not be empty".into()),
            }
        }
        Command::Logout => {
            if Session::logout(social.store.as_ref())? {
                println!("logged out");
            } else {
                println!("no active session");
            }
        }
        Command::Whoami => match &me {
            Some(id) => {
                let shown = social.resolver.display_for(id)?;
                println!("{} ({})", shown.label, id);
            }
            None => println!("not logged in"),
        },
        Command::Profile { action } => match action {
            ProfileCommand::Set { name, avatar } => {
                let me = require(&me)?;
                match social.resolver.set_profile(me, &name, avatar.as_deref())? {
                    Some(p) => println!("profile updated: {}", p.display_name),
                    None => return Err("display name must not be empty".into()),
                }
            }
            ProfileCommand::Show { identity } => {
                let target = match identity {
                    Some(id) => id,
                    None => require(&me)?.to_string(),
                };
                let viewer = me.clone().unwrap_or_default();
                let summary = social.profile_summary(&viewer, &target)?;
                println!("{}", render_display(&summary.display));
                println!("  {}", summary.identity);
                println!(
                    "  {} posts, {} followers, {} following",
                    summary.post_count, summary.counts.followers, summary.counts.following
                );
                if summary.viewer_follows {
                    println!("  you follow them");
                }
            }
        },
        Command::Post { body, media } => {
            let me = require(&me)?;
            let draft = NewPost {
                owner: me.to_string(),
                body,
                media_ref: media,
            };
            match social.posts.create_post(draft)? {
                Some(post) => println!("posted {}", post.content_key()),
                None => return Err("a post needs text or media".into()),
            }
        }
        Command::Feed { following } => {
            let filter = if following {
                FeedFilter::Following
            } else {
                FeedFilter::All
            };
            let viewer = me.clone().unwrap_or_default();
            for post in social.posts.feed(&viewer, filter)? {
                print_post(&social, &post, &viewer)?;
            }
        }
        Command::Search { query } => {
            for hit in social.posts.search_people(&query)? {
                println!("{}  {}", hit.identity, render_display(&hit.display));
            }
        }
        Command::Follow { identity } => {
            let me = require(&me)?;
            if social.follows.follow(me, &identity)? {
                println!("now following {identity}");
            } else {
                println!("nothing to do");
            }
        }
        Command::Unfollow { identity } => {
            let me = require(&me)?;
            if social.follows.unfollow(me, &identity)? {
                println!("unfollowed {identity}");
            } else {
                println!("not following {identity}");
            }
        }
        Command::Like { post } => {
            let me = require(&me)?;
            let post = find_post(&social, &post)?;
            let summary = social.engagement.toggle_like(&post, me)?;
            let verb = if summary.liked_by_viewer { "liked" } else { "unliked" };
            println!("{verb} ({} likes)", summary.like_count);
        }
        Command::Comment { post, text } => {
            let me = require(&me)?;
            let post = find_post(&social, &post)?;
            let author = social.comment_author(me)?;
            if social.engagement.add_comment(&post, &author, &text)?.is_none() {
                return Err("comment must not be empty".into());
            }
            println!("commented on {}", post.content_key());
        }
        Command::Comments { post } => {
            let viewer = me.clone().unwrap_or_default();
            let post = find_post(&social, &post)?;
            let record = social.engagement.engagement(&post, &viewer)?;
            let mark = if record.liked_by_viewer { " (you)" } else { "" };
            println!("{} likes{mark}", record.like_count);
            for c in record.comments {
                println!("  {}: {}", c.author_label, c.text);
            }
        }
        Command::Send { to, text } => {
            let me = require(&me)?;
            if social
                .conversations
                .append_message(me, &to, me, &text)?
                .is_none()
            {
                return Err("message must not be empty".into());
            }
            println!("sent to {to}");
        }
        Command::Messages { with } => {
            let me = require(&me)?;
            for m in social.conversations.list_messages(me, &with)? {
                print_message(&social, &m)?;
            }
        }
        Command::Conversations => {
            let me = require(&me)?;
            for peer in social.conversations.list_conversations(me)? {
                println!("{}  {}", peer.identity, render_display(&peer.display));
            }
        }
        Command::Notifications { mark_read } => {
            let me = require(&me)?;
            println!("{} unread", social.notifications.unread_count(me)?);
            for n in social.notifications.list(me)? {
                print_notification(&n);
            }
            if mark_read {
                social.notifications.mark_all_read(me)?;
            }
        }
        Command::Watch { target } => {
            let me = require(&me)?.to_string();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(watch(social, config, me, target))?;
        }
    }
    Ok(())
}

fn require(identity: &Option<String>) -> Result<&str, Box<dyn Error>> {
    identity
        .as_deref()
        .ok_or_else(|| "not logged in: run `oldworld login <identity>` or pass --identity".into())
}

fn find_post(social: &Social, key: &str) -> Result<Post, Box<dyn Error>> {
    Ok(social
        .posts
        .find(key)?
        .ok_or_else(|| format!("no post {key}"))?)
}

fn render_display(display: &Display) -> String {
    match &display.avatar {
        Some(avatar) => format!("{} [{avatar}]", display.label),
        None => display.label.clone(),
    }
}

fn print_post(social: &Social, post: &Post, viewer: &str) -> Result<(), Box<dyn Error>> {
    let author = social.posts.author_display(post)?;
    let likes = social.engagement.like_summary(post, viewer)?;
    let comments = social.engagement.comments(post)?.len();
    println!("#{} {} ({})", post.content_key(), author.label, post.owner);
    if !post.body.is_empty() {
        println!("  {}", post.body);
    }
    if let Some(media) = &post.media_ref {
        println!("  [{media}]");
    }
    let mark = if likes.liked_by_viewer { "*" } else { "" };
    println!("  {}{mark} likes, {comments} comments", likes.like_count);
    Ok(())
}

fn print_message(social: &Social, m: &MessageRecord) -> Result<(), Box<dyn Error>> {
    let sender = social.resolver.display_for(&m.sender)?;
    println!("{}: {}", sender.label, m.text);
    Ok(())
}

fn print_notification(n: &NotificationRecord) {
    let mark = if n.read { " " } else { "*" };
    println!("{mark} {} {}", n.actor_name, n.payload);
}

async fn watch(
    social: Social,
    config: Config,
    me: String,
    target: WatchCommand,
) -> Result<(), Box<dyn Error>> {
    let mut scheduler = SyncScheduler::new(config.poll_interval);
    match target {
        WatchCommand::Notifications => {
            let mut rx = scheduler.watch_notifications(social.notifications.clone(), &me)?;
            print_feed(&rx.borrow_and_update());
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        print_feed(&rx.borrow_and_update());
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        WatchCommand::Chat { with } => {
            let mut rx = scheduler.watch_conversation(social.conversations.clone(), &me, &with)?;
            let mut shown = 0;
            loop {
                let messages = rx.borrow_and_update().clone();
                for m in messages.iter().skip(shown) {
                    print_message(&social, m)?;
                }
                shown = messages.len();
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    scheduler.stop_all();
    Ok(())
}

fn print_feed(feed: &NotificationFeed) {
    println!("-- {} unread --", feed.unread);
    for n in feed.items.iter().take(10) {
        print_notification(n);
    }
}
