use anyhow::{anyhow, Result};
use clap::Parser;
use fitsearch_core::RawContent;
use parking_lot::{Mutex, RwLock};
use reqwest::{header, Client};
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Fetch fitness pages into JSONL raw-content records, respecting robots.txt")]
struct Cli {
    /// File with seed URLs (one per line, '#' comments allowed)
    #[arg(long)]
    seeds: String,
    /// Output JSONL file path
    #[arg(long, default_value = "./sample_data/pages.jsonl")]
    output: String,
    /// Maximum number of pages to emit
    #[arg(long, default_value_t = 1_000)]
    max_pages: usize,
    /// Maximum pages to fetch per host
    #[arg(long, default_value_t = 50)]
    max_per_host: usize,
    /// Number of concurrent fetches
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent for robots.txt and page requests
    #[arg(long, default_value = "fitsearch-bot/0.1")]
    user_agent: String,
    /// Also queue same-host links found on fetched pages
    #[arg(long, default_value_t = false)]
    follow_links: bool,
    /// Tag attached to every emitted record (repeatable)
    #[arg(long = "tag")]
    tags: Vec<String>,
}

/// Rules of the `*` group of a robots.txt file.
#[derive(Debug, Clone, Default)]
struct Robots {
    allows: Vec<String>,
    disallows: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl Robots {
    fn parse(txt: &str) -> Self {
        let mut rules = Robots::default();
        let mut in_star_group = false;
        for line in txt.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else { continue };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "user-agent" => in_star_group = value == "*",
                "allow" if in_star_group && !value.is_empty() => rules.allows.push(value.to_string()),
                "disallow" if in_star_group && !value.is_empty() => rules.disallows.push(value.to_string()),
                "crawl-delay" if in_star_group => {
                    rules.crawl_delay = value.parse::<f64>().ok().map(Duration::from_secs_f64);
                }
                _ => {}
            }
        }
        rules
    }

    /// Longest matching rule wins; ties go to Allow.
    fn allows(&self, path: &str) -> bool {
        let longest = |rules: &[String]| rules.iter().filter(|r| path.starts_with(r.as_str())).map(String::len).max();
        match (longest(&self.allows), longest(&self.disallows)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }
}

type RobotsCache = Arc<RwLock<HashMap<String, Robots>>>;

/// One lock per host, holding the start time of its last request. Fetches to a
/// host run one at a time and are spaced by its crawl-delay.
#[derive(Clone, Default)]
struct HostGates {
    gates: Arc<Mutex<HashMap<String, Arc<AsyncMutex<Option<Instant>>>>>>,
}

impl HostGates {
    /// Wait for `host`'s turn. Keep the guard until the request completes.
    async fn acquire(&self, host: &str, delay: Option<Duration>) -> OwnedMutexGuard<Option<Instant>> {
        let gate = self.gates.lock().entry(host.to_string()).or_default().clone();
        let mut last = gate.lock_owned().await;
        if let (Some(delay), Some(prev)) = (delay, *last) {
            let since = prev.elapsed();
            if since < delay {
                sleep(delay - since).await;
            }
        }
        *last = Some(Instant::now());
        last
    }
}

struct Page {
    url: Url,
    html: String,
    links: Vec<Url>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();
    if let Some(dir) = std::path::Path::new(&args.output).parent() {
        fs::create_dir_all(dir)?;
    }

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let mut frontier = load_seeds(&args.seeds)?;
    if frontier.is_empty() {
        return Err(anyhow!("no valid seeds in {}", args.seeds));
    }
    tracing::info!(seeds = frontier.len(), max_pages = args.max_pages, concurrency = args.concurrency, "crawl starting");

    let mut out = BufWriter::new(File::create(&args.output)?);
    let robots: RobotsCache = Arc::new(RwLock::new(HashMap::new()));
    let gates = HostGates::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut per_host: HashMap<String, usize> = HashMap::new();
    let mut inflight: JoinSet<Option<Page>> = JoinSet::new();
    let mut emitted = 0usize;

    while emitted < args.max_pages && (!frontier.is_empty() || !inflight.is_empty()) {
        while inflight.len() < args.concurrency.max(1) && emitted + inflight.len() < args.max_pages {
            let Some(url) = frontier.pop_front() else { break };
            let Some(host) = url.host_str().map(str::to_string) else { continue };
            if !seen.insert(without_fragment(&url)) {
                continue;
            }
            let count = per_host.entry(host).or_insert(0);
            if *count >= args.max_per_host {
                continue;
            }
            *count += 1;
            inflight.spawn(fetch_page(client.clone(), robots.clone(), gates.clone(), url, args.follow_links));
        }

        let Some(joined) = inflight.join_next().await else { break };
        let page = match joined {
            Ok(Some(page)) => page,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "fetch task failed");
                continue;
            }
        };

        for link in page.links {
            if link.host_str() == page.url.host_str() {
                frontier.push_back(link);
            }
        }
        let record = RawContent::html(without_fragment(&page.url), page.html)
            .with_tags(args.tags.iter().cloned())
            .with_created_at(OffsetDateTime::now_utc());
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        emitted += 1;
        if emitted % 100 == 0 {
            tracing::info!(emitted, visited = seen.len(), frontier = frontier.len(), "progress");
        }
    }
    out.flush()?;

    tracing::info!(emitted, visited = seen.len(), output = %args.output, "crawl done");
    Ok(())
}

fn load_seeds(path: &str) -> Result<VecDeque<Url>> {
    let mut frontier = VecDeque::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') { continue; }
        match Url::parse(&s).or_else(|_| Url::parse(&format!("https://{s}"))) {
            Ok(u) => frontier.push_back(u),
            Err(e) => tracing::warn!(seed = %s, error = %e, "skipping seed"),
        }
    }
    Ok(frontier)
}

fn without_fragment(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string()
}

async fn fetch_page(client: Client, robots: RobotsCache, gates: HostGates, url: Url, follow_links: bool) -> Option<Page> {
    let rules = robots_for(&client, &robots, &url).await?;
    if !rules.allows(url.path()) {
        tracing::debug!(%url, "disallowed by robots.txt");
        return None;
    }
    let _turn = gates.acquire(url.host_str()?, rules.crawl_delay).await;

    let resp = match client.get(url.clone()).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            tracing::debug!(%url, status = %resp.status(), "non-success status");
            return None;
        }
        Err(e) => {
            tracing::debug!(%url, error = %e, "request failed");
            return None;
        }
    };
    let is_html = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |v| v.starts_with("text/html"));
    if !is_html {
        return None;
    }
    let bytes = resp.bytes().await.ok()?;
    if bytes.len() > MAX_BODY_BYTES {
        tracing::debug!(%url, bytes = bytes.len(), "page too large");
        return None;
    }
    let html = String::from_utf8_lossy(&bytes).into_owned();
    let links = if follow_links { extract_links(&url, &html) } else { Vec::new() };
    Some(Page { url, html, links })
}

fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let Ok(sel) = Selector::parse("a[href]") else { return Vec::new() };
    Html::parse_document(html)
        .select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|h| base.join(h).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .collect()
}

/// Cached robots rules for the url's host. `None` when the url has no host.
async fn robots_for(client: &Client, cache: &RobotsCache, url: &Url) -> Option<Robots> {
    let host = url.host_str()?.to_string();
    if let Some(r) = cache.read().get(&host) {
        return Some(r.clone());
    }
    let robots_url = format!("{}://{}/robots.txt", url.scheme(), host);
    let txt = match client.get(&robots_url).send().await {
        Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
        _ => String::new(),
    };
    let parsed = Robots::parse(&txt);
    cache.write().insert(host, parsed.clone());
    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn robots_longest_match_wins() {
        let r = Robots::parse("User-agent: *\nDisallow: /members\nAllow: /members/free-plans\nCrawl-delay: 1.5\n");
        assert!(r.allows("/articles/squats"));
        assert!(!r.allows("/members/area"));
        assert!(r.allows("/members/free-plans/week1"));
        assert_eq!(r.crawl_delay, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn robots_ignores_other_agents() {
        let r = Robots::parse("User-agent: otherbot\nDisallow: /\n\nUser-agent: *\nDisallow: /admin # private\n");
        assert!(r.allows("/plans"));
        assert!(!r.allows("/admin/users"));
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let r = Robots::parse("User-agent: *\nDisallow:\n");
        assert!(r.allows("/anything"));
    }

    #[tokio::test]
    async fn same_host_requests_are_serialized_and_spaced() {
        let gates = HostGates::default();
        let delay = Some(Duration::from_millis(60));
        let started = Instant::now();
        let first = gates.acquire("fit.example", delay).await;

        let waiter = {
            let gates = gates.clone();
            tokio::spawn(async move {
                let _turn = gates.acquire("fit.example", delay).await;
                Instant::now()
            })
        };
        // Another host is not blocked by the held gate.
        let _other = gates.acquire("gym.example", delay).await;

        sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);
        let second_at = waiter.await.unwrap();
        assert!(second_at.duration_since(started) >= Duration::from_millis(60));
    }

    #[test]
    fn links_resolve_against_base() {
        let base = Url::parse("https://fit.example/plans/").unwrap();
        let links = extract_links(&base, r#"<a href="week1">w1</a><a href="mailto:x@y">m</a><a href="/about#team">a</a>"#);
        let got: Vec<String> = links.iter().map(Url::to_string).collect();
        assert_eq!(got, vec!["https://fit.example/plans/week1", "https://fit.example/about#team"]);
    }
}
