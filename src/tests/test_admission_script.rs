use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

use redis::{Value, aio::ConnectionManager};

use crate::{
    ADMISSION_SCRIPT, Decision, ScriptStore,
    redis::admission_script::{AdmissionArgs, parse_admission_reply},
};

fn redis_url() -> String {
    env::var("REDIS_URL")
        .expect("REDIS_URL must be set to run redis script tests (e.g. redis://127.0.0.1:6379/)")
}

fn unique_key(name: &str) -> String {
    let n: u64 = rand::random();
    format!("slidegate_test_{n}:{name}")
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

async fn connect() -> (ConnectionManager, String) {
    let client = redis::Client::open(redis_url()).unwrap();
    let cm = client.get_connection_manager().await.unwrap();
    let sha = cm.load_script(ADMISSION_SCRIPT).await.unwrap();

    (cm, sha)
}

async fn admit(cm: &ConnectionManager, sha: &str, key: &str, args: AdmissionArgs) -> Decision {
    let reply = cm.eval_sha(sha, key, &args.to_argv()).await.unwrap();
    parse_admission_reply(&reply).unwrap()
}

fn args(now_ms: u64, window_ms: u64, limit: u64, ttl_ms: u64, cost: u64) -> AdmissionArgs {
    AdmissionArgs {
        now_ms,
        window_ms,
        limit,
        ttl_ms,
        cost,
    }
}

async fn members_with_scores(cm: &ConnectionManager, key: &str) -> Vec<(String, u64)> {
    let mut conn = cm.clone();
    redis::cmd("ZRANGE")
        .arg(key)
        .arg(0)
        .arg(-1)
        .arg("WITHSCORES")
        .query_async(&mut conn)
        .await
        .unwrap()
}

async fn pttl(cm: &ConnectionManager, key: &str) -> i64 {
    let mut conn = cm.clone();
    redis::cmd("PTTL").arg(key).query_async(&mut conn).await.unwrap()
}

#[test]
fn window_boundary_is_inclusive() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (cm, sha) = connect().await;
        let key = unique_key("edge");
        let t0 = wall_clock_ms();

        let d = admit(&cm, &sha, &key, args(t0, 3000, 5, 10_000, 5)).await;
        assert_eq!(d, Decision::allowed(0));

        let d = admit(&cm, &sha, &key, args(t0 + 10, 3000, 5, 10_000, 1)).await;
        assert!(!d.allowed);
        assert_eq!(d.retry_after.as_millis(), 2990);

        let d = admit(&cm, &sha, &key, args(t0 + 2999, 3000, 5, 10_000, 1)).await;
        assert!(!d.allowed, "one millisecond before the boundary the events still count");
        assert_eq!(d.retry_after.as_millis(), 1);

        // Exactly one window later the events have left the window.
        let d = admit(&cm, &sha, &key, args(t0 + 3000, 3000, 5, 10_000, 1)).await;
        assert_eq!(d, Decision::allowed(4));
    });
}

#[test]
fn members_stay_distinct_across_calls_at_the_same_instant() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (cm, sha) = connect().await;
        let key = unique_key("members");
        let t0 = wall_clock_ms();

        // Same now_ms for every call; TIME may repeat, the sequence part may not.
        for _ in 0..4 {
            admit(&cm, &sha, &key, args(t0, 5000, 100, 10_000, 3)).await;
        }

        let members = members_with_scores(&cm, &key).await;
        assert_eq!(members.len(), 12);
        assert!(members.iter().all(|(_, score)| *score == t0));

        let mut sequence: Vec<u64> = members
            .iter()
            .map(|(member, _)| member.rsplit(':').next().unwrap().parse().unwrap())
            .collect();
        sequence.sort_unstable();
        assert_eq!(sequence, (1..=12).collect::<Vec<u64>>());
    });
}

#[test]
fn admission_sets_key_ttl() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (cm, sha) = connect().await;
        let key = unique_key("ttl");

        admit(&cm, &sha, &key, args(wall_clock_ms(), 1000, 5, 7000, 1)).await;

        let ttl = pttl(&cm, &key).await;
        assert!(ttl > 6000 && ttl <= 7000, "unexpected pttl {ttl}");
    });
}

#[test]
fn cost_is_clamped_into_range() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (cm, sha) = connect().await;
        let now = wall_clock_ms();

        let big = unique_key("big");
        let d = admit(&cm, &sha, &big, args(now, 5000, 500, 10_000, 250)).await;
        assert_eq!(d, Decision::allowed(400));
        assert_eq!(members_with_scores(&cm, &big).await.len(), 100);

        let zero = unique_key("zero");
        let d = admit(&cm, &sha, &zero, args(now, 5000, 500, 10_000, 0)).await;
        assert_eq!(d, Decision::allowed(499));
        assert_eq!(members_with_scores(&cm, &zero).await.len(), 1);
    });
}

#[test]
fn rejection_leaves_window_untouched() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (cm, sha) = connect().await;
        let key = unique_key("reject");
        let t0 = wall_clock_ms();

        let d = admit(&cm, &sha, &key, args(t0, 5000, 10, 60_000, 7)).await;
        assert_eq!(d, Decision::allowed(3));

        let before = members_with_scores(&cm, &key).await;
        let ttl_before = pttl(&cm, &key).await;

        let d = admit(&cm, &sha, &key, args(t0 + 100, 5000, 10, 60_000, 4)).await;
        assert!(!d.allowed);
        assert_eq!(d.remaining, 3);
        assert_eq!(d.retry_after.as_millis(), 4900);

        assert_eq!(members_with_scores(&cm, &key).await, before);
        assert!(pttl(&cm, &key).await <= ttl_before, "rejection must not refresh the TTL");
    });
}

#[test]
fn raw_reply_is_three_integers() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let (cm, sha) = connect().await;
        let key = unique_key("raw");

        let reply = cm
            .eval_sha(&sha, &key, &args(wall_clock_ms(), 1000, 2, 1000, 1).to_argv())
            .await
            .unwrap();

        assert_eq!(reply, vec![Value::Int(1), Value::Int(1), Value::Int(0)]);
    });
}
