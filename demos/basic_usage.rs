//! Walkthrough of policies, stale-while-revalidate and tag invalidation.

use revalidate_kit::{error::Result, Cache, CachePolicy, EntryState, FetchOptions};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize, Debug)]
struct Post {
    slug: String,
    title: String,
    revision: u32,
}

/// Pretend CMS: every fetch returns a new revision.
#[derive(Clone, Default)]
struct Cms {
    revision: Arc<AtomicU32>,
}

impl Cms {
    async fn load_post(&self, slug: &str) -> std::result::Result<Post, String> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  [CMS] Loading post {} (revision {})", slug, revision);

        Ok(Post {
            slug: slug.to_string(),
            title: "Hello, world".to_string(),
            revision,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== revalidate-kit - Basic Example ===\n");

    let cache = Cache::new();
    let cms = Cms::default();
    let fetch_post = {
        let cms = cms.clone();
        move || {
            let cms = cms.clone();
            async move { cms.load_post("hello-world").await }
        }
    };
    let policy = CachePolicy::Revalidate { seconds: 1.0 };

    // 1. Miss - the fetcher runs once
    println!("1. First read (miss):");
    let post: Post = cache
        .get_tagged("/blog/hello-world", fetch_post.clone(), policy, &["posts"])
        .await?;
    println!("   ✓ Got revision {}\n", post.revision);

    // 2. Hit - served from the cache
    println!("2. Second read (fresh hit):");
    let post: Post = cache
        .get_tagged("/blog/hello-world", fetch_post.clone(), policy, &["posts"])
        .await?;
    println!("   ✓ Got revision {} without fetching\n", post.revision);

    // 3. Stale - old value now, refresh in the background
    println!("3. Read after the 1s window (stale-while-revalidate):");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let post: Post = cache
        .get_tagged("/blog/hello-world", fetch_post.clone(), policy, &["posts"])
        .await?;
    println!(
        "   ✓ Served stale revision {} (state: {:?})",
        post.revision,
        cache.state("/blog/hello-world")
    );
    while cache.is_fetching("/blog/hello-world") {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let post: Post = cache
        .get_tagged("/blog/hello-world", fetch_post.clone(), policy, &["posts"])
        .await?;
    println!("   ✓ Refreshed to revision {}\n", post.revision);

    // 4. On-demand invalidation by tag
    println!("4. revalidate_tag(\"posts\"):");
    let touched = cache.revalidate_tag("posts");
    println!(
        "   ✓ {} entries marked, state is now {:?}\n",
        touched,
        cache.state("/blog/hello-world")
    );
    assert_eq!(cache.state("/blog/hello-world"), Some(EntryState::Stale));

    // 5. NoStore - always fetch, never store
    println!("5. NoStore read:");
    let post: Post = cache
        .get("/blog/preview", fetch_post.clone(), CachePolicy::NoStore)
        .await?;
    println!(
        "   ✓ Got revision {}, cached: {}\n",
        post.revision,
        cache.state("/blog/preview").is_some()
    );

    // 6. Concurrent misses share one fetch
    println!("6. Ten concurrent reads of a new key:");
    let reads = (0..10).map(|_| {
        cache.get::<Post, _>("/blog/popular", fetch_post.clone(), CachePolicy::ForceCache)
    });
    let posts = futures::future::join_all(reads).await;
    let revisions: Vec<u32> = posts
        .into_iter()
        .map(|p| p.map(|p| p.revision))
        .collect::<Result<_>>()?;
    println!("   ✓ All readers got revision {:?}\n", revisions.first());

    // ========================================================================
    // ADVANCED USAGE: Per-Read Options
    // ========================================================================

    println!("\n=== Advanced Usage Examples ===\n");

    // 7. Hard TTL and retries for one read
    println!("7. FetchOptions with hard expiry and retries:");
    let options = FetchOptions::new(CachePolicy::Revalidate { seconds: 60.0 })
        .with_tags(["posts", "featured"])
        .with_expire(Duration::from_secs(3600))
        .with_retry(2);
    let post: Post = cache
        .get_with_options("/blog/featured", fetch_post.clone(), options)
        .await?;
    println!("   ✓ Got revision {}\n", post.revision);

    cache.log_stats();
    println!("{:#?}", cache.stats());

    Ok(())
}
