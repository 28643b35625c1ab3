//! Default values for configuration

/// Concurrent requests allowed against a single domain
pub fn default_crawl_concurrency_per_domain() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Base delay between requests to the same domain (milliseconds)
pub fn default_crawl_delay_ms() -> u64 {
    1000
}

/// Upper bound of the random jitter added to the delay (milliseconds)
pub fn default_crawl_jitter_ms() -> u64 {
    1000
}

/// Default request timeout in seconds
pub fn default_crawl_timeout() -> u64 {
    30
}

/// Redirect hops followed before giving up on a URL
pub fn default_crawl_max_redirects() -> usize {
    10
}

/// Default user agent. Pages are fetched as a regular desktop browser would.
pub fn default_crawl_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36".to_string()
}

/// URLs fetched per scrape batch
pub fn default_scrape_batch_size() -> usize {
    100
}

/// Entities written per index batch
pub fn default_index_batch_size() -> usize {
    500
}

/// Retries for a locked database while marking URLs as indexed
pub fn default_lock_retries() -> u32 {
    5
}

/// Sleep between locked-database retries (milliseconds)
pub fn default_lock_backoff_ms() -> u64 {
    1000
}

/// Maximum results returned by a search
pub fn default_search_limit() -> usize {
    100
}

/// Keep temporary copies of locked browser databases
pub fn default_keep_tmp_files() -> bool {
    false
}
