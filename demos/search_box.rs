//! Typing Into a Search Box: Debounce, Throttle and Catch
//!
//! This demo wires one keystroke source into two chains:
//! 1. A debounced chain that only "searches" once typing pauses.
//! 2. A throttled chain that updates a progress indicator at most every 50ms.
//! 3. A catch boundary that swallows failures from the search backend.
//! 4. Disposal through a cancellation token.
use evflow::{Dispose, Error, Subject};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let keystrokes = Subject::<String>::new();
    let shutdown = CancellationToken::new();

    // 1. Search once the user stops typing for 120ms
    let search = keystrokes
        .observe()
        .until_cancelled(shutdown.clone())
        .debounce(Duration::from_millis(120))
        .catch(|error, query| {
            println!("[Search] backend failed for {query:?}: {error}");
            true
        })
        .on(|query| {
            if query.ends_with('!') {
                return Err(Error::msg("query rejected"));
            }
            println!("[Search] querying for {query:?}");
            Ok(())
        });

    // 2. Progress indicator, rate limited
    let progress = keystrokes
        .observe()
        .throttle_latest(Duration::from_millis(50))
        .on(|query| {
            println!("[Progress] {} characters typed", query.len());
            Ok(())
        });

    // 3. Type "rust", pause, then type an invalid query
    let mut query = String::new();
    for key in "rust".chars() {
        query.push(key);
        keystrokes.emit(query.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    keystrokes.emit("rust!".to_string()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // 4. Shut everything down
    shutdown.cancel();
    progress.dispose();
    search.lifecycle().disposed().await;
    println!("Chains disposed.");
}
