mod common;

use common::{ScriptedSource, account};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tally_core::CryptoCurrency;
use tally_fi::AccountKind;
use tally_serve::source::AssetAccountSource;
use tally_serve::{AccountAggregator, AggregatorConfig, InitializationSignal};
use tokio::time::Instant;

fn ready_signal() -> Arc<InitializationSignal> {
    let signal = Arc::new(InitializationSignal::new());
    signal.mark_initialized();
    signal
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_fetch() {
    // Test: callers arriving while a fetch is running wait on that fetch
    let btc = Arc::new(
        ScriptedSource::new(
            "BTC",
            CryptoCurrency::Bitcoin,
            vec![account(CryptoCurrency::Bitcoin, "1abc", AccountKind::NonCustodial)],
        )
        .with_delay(Duration::from_millis(100)),
    );
    let aggregator = AccountAggregator::new(
        vec![btc.clone() as Arc<dyn AssetAccountSource>],
        ready_signal(),
        AggregatorConfig::default(),
    );

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move { aggregator.accounts().await })
        })
        .collect();

    for result in join_all(tasks).await {
        let accounts = result.expect("task panicked").expect("accounts failed");
        assert_eq!(accounts.len(), 1);
    }

    assert_eq!(btc.fetch_count(), 1, "Sources should be fetched exactly once");
}

#[tokio::test(start_paused = true)]
async fn test_merge_order_ignores_completion_order() {
    // Test: slowest source first, fastest last; output follows declaration order
    let completions = Arc::new(Mutex::new(Vec::new()));
    let sources: Vec<Arc<dyn AssetAccountSource>> = vec![
        Arc::new(
            ScriptedSource::new(
                "BTC",
                CryptoCurrency::Bitcoin,
                vec![
                    account(CryptoCurrency::Bitcoin, "btc-1", AccountKind::NonCustodial),
                    account(CryptoCurrency::Bitcoin, "btc-2", AccountKind::NonCustodial),
                ],
            )
            .with_delay(Duration::from_millis(300))
            .recording(completions.clone()),
        ),
        Arc::new(
            ScriptedSource::new(
                "ETH",
                CryptoCurrency::Ethereum,
                vec![account(CryptoCurrency::Ethereum, "eth", AccountKind::NonCustodial)],
            )
            .with_delay(Duration::from_millis(200))
            .recording(completions.clone()),
        ),
        Arc::new(
            ScriptedSource::new(
                "XLM",
                CryptoCurrency::Stellar,
                vec![account(CryptoCurrency::Stellar, "xlm", AccountKind::NonCustodial)],
            )
            .with_delay(Duration::from_millis(10))
            .recording(completions.clone()),
        ),
    ];
    let aggregator = AccountAggregator::new(sources, ready_signal(), AggregatorConfig::default());

    let accounts = aggregator.fetch_accounts().await.expect("fetch failed");

    let addresses: Vec<&str> = accounts.iter().map(|a| a.address().value()).collect();
    assert_eq!(addresses, vec!["btc-1", "btc-2", "eth", "xlm"]);
    assert_eq!(*completions.lock().unwrap(), vec!["XLM", "ETH", "BTC"]);
}

#[tokio::test(start_paused = true)]
async fn test_sources_are_fetched_in_parallel() {
    // Test: three 200ms sources should take ~200ms, not 600ms
    let sources: Vec<Arc<dyn AssetAccountSource>> = [
        (CryptoCurrency::Bitcoin, "btc"),
        (CryptoCurrency::Ethereum, "eth"),
        (CryptoCurrency::Pax, "pax"),
    ]
    .into_iter()
    .map(|(currency, address)| {
        Arc::new(
            ScriptedSource::new(
                currency.code(),
                currency,
                vec![account(currency, address, AccountKind::NonCustodial)],
            )
            .with_delay(Duration::from_millis(200)),
        ) as Arc<dyn AssetAccountSource>
    })
    .collect();
    let aggregator = AccountAggregator::new(sources, ready_signal(), AggregatorConfig::default());

    let start = Instant::now();
    let accounts = aggregator.fetch_accounts().await.expect("fetch failed");
    let elapsed = start.elapsed();

    println!("✓ Three parallel sources took: {:?}", elapsed);
    assert_eq!(accounts.len(), 3);
    assert!(
        elapsed < Duration::from_millis(300),
        "Sources should run concurrently, took {:?}",
        elapsed
    );
}

#[tokio::test(start_paused = true)]
async fn test_forced_fetch_during_fetch_is_shared() {
    // Test: a refresh requested mid-fetch joins the running fetch
    let btc = Arc::new(
        ScriptedSource::new(
            "BTC",
            CryptoCurrency::Bitcoin,
            vec![account(CryptoCurrency::Bitcoin, "1abc", AccountKind::NonCustodial)],
        )
        .with_delay(Duration::from_millis(100)),
    );
    let aggregator = AccountAggregator::new(
        vec![btc.clone() as Arc<dyn AssetAccountSource>],
        ready_signal(),
        AggregatorConfig::default(),
    );

    let (cached, forced) = tokio::join!(aggregator.accounts(), aggregator.fetch_accounts());
    assert_eq!(cached.unwrap(), forced.unwrap());
    assert_eq!(btc.fetch_count(), 1);
}
