// Dynamic community detection demo
//
// 1. Three cliques joined by two bridge nodes, fresh SLPA run
// 2. A batch of edits applied directly through the engine
// 3. The same kind of edits streamed through the background update worker

use anyhow::Result;
use slpa_common::config::SlpaConfig;
use slpa_core::{ChangeRecord, CommunityResult, GraphStore, SlpaEngine, UpdateWorker};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut config = SlpaConfig::load()?;
    config.propagation.seed.get_or_insert(42);
    config.propagation.cutoff = 0.1;

    println!("\nDynamic SLPA Demo");
    println!("=================\n");

    // engineering 1-3, marketing 4-6, sales 7-9, bridges 10 and 11
    let edges = [
        (1, 2), (1, 3), (2, 3),
        (4, 5), (4, 6), (5, 6),
        (7, 8), (7, 9), (8, 9),
        (10, 2), (10, 4),
        (11, 3), (11, 5), (11, 7),
    ];
    let graph = GraphStore::from_edges(11, &edges)?;
    let mut engine = SlpaEngine::with_config(graph, config.clone())?;

    let start = Instant::now();
    engine.run()?;
    println!("Initial run ({:?}):", start.elapsed());
    print_communities(&engine.communities());

    println!("\nApplying batch: link sales to engineering, cut a bridge, add a node");
    let outcomes = engine.apply_changes(&[
        ChangeRecord::add_edge(9, 1),
        ChangeRecord::remove_edge(11, 5),
        ChangeRecord::add_node(),
        ChangeRecord::add_edge(12, 8),
        ChangeRecord::add_edge(12, 12),
    ])?;
    for outcome in &outcomes {
        match outcome {
            Ok(effect) => println!("  ok   {:?}", effect),
            Err(e) => println!("  fail {}", e),
        }
    }
    print_communities(&engine.communities());

    println!("\nStreaming changes through the update worker");
    let shared = Arc::new(RwLock::new(engine));
    let (handle, join) = UpdateWorker::spawn(shared.clone(), config.worker.clone());
    for record in [
        ChangeRecord::add_edge(6, 7),
        ChangeRecord::add_edge(6, 8),
        ChangeRecord::remove_edge(10, 4),
        ChangeRecord::add_edge(3, 99),
    ] {
        handle.submit(record).await?;
    }
    // threshold batches report here too
    for outcome in handle.flush().await? {
        match outcome {
            Ok(effect) => println!("  ok   {:?}", effect),
            Err(e) => println!("  fail {}", e),
        }
    }
    drop(handle);
    join.await?;

    print_communities(&shared.read().await.communities());
    Ok(())
}

fn print_communities(result: &CommunityResult) {
    println!("  {} communities", result.num_communities);
    for (label, members) in &result.community_to_nodes {
        println!("  community {:>3}: {:?}", label, members);
    }
    if !result.overlapping_nodes.is_empty() {
        println!("  overlapping nodes: {:?}", result.overlapping_nodes);
    }
}
