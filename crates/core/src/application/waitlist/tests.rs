use super::*;
use crate::application::expiry::ExpiryHandler;
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::ticket_store::mocks::InMemoryTicketStore;
use crate::port::time_provider::mocks::TokioClock;
use crate::port::IdProvider;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

const BASE: i64 = 1_700_000_000_000;

struct Harness {
    service: Arc<WaitlistService>,
    store: Arc<InMemoryTicketStore>,
    clock: Arc<TokioClock>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(WaitlistConfig::default())
    }

    fn with_config(config: WaitlistConfig) -> Self {
        Self::build(config, Arc::new(SequentialIdProvider::new()))
    }

    fn build(config: WaitlistConfig, ids: Arc<dyn IdProvider>) -> Self {
        let store = Arc::new(InMemoryTicketStore::new());
        let clock = Arc::new(TokioClock::new(BASE));
        let service = WaitlistService::new(store.clone(), ids, clock.clone(), config);
        Self {
            service,
            store,
            clock,
        }
    }

    fn request(&self, id: &str, ttl_ms: i64) -> CreateTicketRequest {
        CreateTicketRequest::new("node-1", "vm-create", id, self.clock.now_millis() + ttl_ms)
    }

    async fn create(&self, id: &str, ttl_ms: i64) -> Ticket {
        self.service.create(self.request(id, ttl_ms)).await.unwrap()
    }

    async fn status(&self, uuid: &str) -> TicketStatus {
        self.service.get(uuid).await.unwrap().status
    }
}

/// Ids that sort in reverse creation order
#[derive(Default)]
struct DescendingIdProvider {
    issued: AtomicU64,
}

impl IdProvider for DescendingIdProvider {
    fn generate_id(&self) -> String {
        let n = self.issued.fetch_add(1, AtomicOrdering::SeqCst);
        format!("t-{:06}", 999_999 - n)
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_release_promotes_waiting_ticket() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;
    assert_eq!(a.status, TicketStatus::Active);
    assert_eq!(a.activated_at, Some(a.created_at));
    assert_eq!(b.status, TicketStatus::Queued);

    let service = h.service.clone();
    let b_uuid = b.uuid.clone();
    let waiter = tokio::spawn(async move { service.wait(&b_uuid, None).await });
    sleep_ms(10).await;

    let released = h.service.release(&a.uuid).await.unwrap();
    assert_eq!(released.status, TicketStatus::Finished);

    let woken = waiter.await.unwrap().unwrap();
    assert_eq!(woken.uuid, b.uuid);
    assert_eq!(woken.status, TicketStatus::Active);
    assert!(woken.activated_at.is_some());

    assert_eq!(h.store.get(&a.uuid).unwrap().status, TicketStatus::Finished);
    assert_eq!(h.store.get(&b.uuid).unwrap().status, TicketStatus::Active);
    h.service.check_invariants().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_expiry_of_holder_promotes_next() {
    let h = Harness::new();
    let a = h.create("123", 3_000).await;
    let b = h.create("123", 60_000).await;

    sleep_ms(2_999).await;
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Active);

    sleep_ms(2).await;
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Expired);
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Active);
    assert_eq!(h.store.get(&a.uuid).unwrap().status, TicketStatus::Expired);
}

#[tokio::test(start_paused = true)]
async fn test_queued_expiry_removes_only_that_ticket() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 1_000).await;
    let c = h.create("123", 60_000).await;

    sleep_ms(1_001).await;
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Active);
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Expired);
    assert_eq!(h.status(&c.uuid).await, TicketStatus::Queued);

    h.service.release(&a.uuid).await.unwrap();
    assert_eq!(h.status(&c.uuid).await, TicketStatus::Active);
    h.service.check_invariants().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fifo_order_within_key() {
    let h = Harness::new();
    let mut tickets = Vec::new();
    for _ in 0..5 {
        tickets.push(h.create("123", 600_000).await);
    }

    for (i, ticket) in tickets.iter().enumerate() {
        assert_eq!(h.status(&ticket.uuid).await, TicketStatus::Active, "ticket {}", i);
        for later in &tickets[i + 1..] {
            assert_eq!(h.status(&later.uuid).await, TicketStatus::Queued);
        }
        h.service.release(&ticket.uuid).await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_fifo_within_same_millisecond() {
    let h = Harness::build(
        WaitlistConfig::default(),
        Arc::new(DescendingIdProvider::default()),
    );

    // Clock is paused: every ticket shares one created_at
    let mut tickets = Vec::new();
    for _ in 0..8 {
        tickets.push(h.create("123", 600_000).await);
    }
    assert!(tickets.iter().all(|t| t.created_at == tickets[0].created_at));

    let created: Vec<String> = tickets.iter().map(|t| t.uuid.clone()).collect();
    let listed: Vec<String> = h
        .service
        .list("node-1")
        .await
        .into_iter()
        .map(|t| t.uuid)
        .collect();
    assert_eq!(listed, created);

    let mut activation_order = Vec::new();
    for _ in 0..tickets.len() {
        let holder = h
            .service
            .list("node-1")
            .await
            .into_iter()
            .find(|t| t.status == TicketStatus::Active)
            .unwrap();
        activation_order.push(created.iter().position(|u| *u == holder.uuid).unwrap());
        h.service.release(&holder.uuid).await.unwrap();
    }
    assert_eq!(activation_order, (0..8).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("456", 60_000).await;
    let other_scope = h
        .service
        .create(CreateTicketRequest::new(
            "node-1",
            "vm-delete",
            "123",
            h.clock.now_millis() + 60_000,
        ))
        .await
        .unwrap();

    assert_eq!(a.status, TicketStatus::Active);
    assert_eq!(b.status, TicketStatus::Active);
    assert_eq!(other_scope.status, TicketStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_create_rejects_past_deadline() {
    let h = Harness::new();
    let now = h.clock.now_millis();

    for expires_at in [now, now - 1] {
        let result = h
            .service
            .create(CreateTicketRequest::new("node-1", "vm", "1", expires_at))
            .await;
        assert!(matches!(result, Err(AppError::InvalidDeadline(_))));
    }
    assert!(h.store.is_empty());
    assert!(h.service.list("node-1").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_keeps_action_and_extra() {
    let h = Harness::new();
    let mut req = h.request("123", 60_000);
    req.action = Some("vm.create".to_string());
    req.extra = serde_json::json!({"vm_uuid": "abc"});

    let ticket = h.service.create(req).await.unwrap();
    let stored = h.store.get(&ticket.uuid).unwrap();
    assert_eq!(stored.action.as_deref(), Some("vm.create"));
    assert_eq!(stored.extra["vm_uuid"], "abc");
}

#[tokio::test(start_paused = true)]
async fn test_release_errors() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;

    assert!(matches!(
        h.service.release("missing").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        h.service.release(&b.uuid).await,
        Err(AppError::NotActive {
            status: TicketStatus::Queued,
            ..
        })
    ));

    h.service.release(&a.uuid).await.unwrap();
    assert!(matches!(
        h.service.release(&a.uuid).await,
        Err(AppError::NotActive {
            status: TicketStatus::Finished,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_expiry_after_release_is_noop() {
    let h = Harness::new();
    let a = h.create("123", 1_000).await;
    let b = h.create("123", 60_000).await;

    h.service.release(&a.uuid).await.unwrap();
    sleep_ms(1_500).await;

    // Late delivery of the cancelled deadline
    h.service.on_expire(&a.uuid).await;

    assert_eq!(h.status(&a.uuid).await, TicketStatus::Finished);
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Active);
    h.service.check_invariants().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_release_after_expiry_fails() {
    let h = Harness::new();
    let a = h.create("123", 1_000).await;
    sleep_ms(1_001).await;

    assert!(matches!(
        h.service.release(&a.uuid).await,
        Err(AppError::NotActive {
            status: TicketStatus::Expired,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_expiry_promotes_once() {
    let h = Harness::new();
    let a = h.create("123", 1_000).await;
    let b = h.create("123", 60_000).await;
    let c = h.create("123", 60_000).await;

    sleep_ms(1_001).await;
    h.service.on_expire(&a.uuid).await;
    h.service.on_expire(&a.uuid).await;

    assert_eq!(h.status(&b.uuid).await, TicketStatus::Active);
    assert_eq!(h.status(&c.uuid).await, TicketStatus::Queued);
    h.service.check_invariants().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_overdue_head_is_never_activated() {
    let h = Harness::new();
    let _a = h.create("123", 1_000).await;
    let b = h.create("123", 1_000).await;
    let c = h.create("123", 60_000).await;

    sleep_ms(1_001).await;
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Expired);
    assert!(h.service.get(&b.uuid).await.unwrap().activated_at.is_none());
    assert_eq!(h.status(&c.uuid).await, TicketStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_wait_returns_immediately_when_decided() {
    let h = Harness::new();
    let a = h.create("123", 1_000).await;
    let b = h.create("456", 60_000).await;

    let active = h.service.wait(&b.uuid, None).await.unwrap();
    assert_eq!(active.status, TicketStatus::Active);

    sleep_ms(1_001).await;
    assert!(matches!(
        h.service.wait(&a.uuid, None).await,
        Err(AppError::TicketExpired {
            status: TicketStatus::Expired,
            ..
        })
    ));

    h.service.release(&b.uuid).await.unwrap();
    assert!(matches!(
        h.service.wait(&b.uuid, None).await,
        Err(AppError::TicketExpired {
            status: TicketStatus::Finished,
            ..
        })
    ));

    assert!(matches!(
        h.service.wait("missing", None).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_and_clamps() {
    let h = Harness::with_config(WaitlistConfig {
        max_wait: Duration::from_secs(1),
        ..Default::default()
    });
    let _a = h.create("123", 600_000).await;
    let b = h.create("123", 600_000).await;

    let result = h
        .service
        .wait(&b.uuid, Some(Duration::from_millis(100)))
        .await;
    assert!(matches!(result, Err(AppError::WaitTimeout(100))));

    let result = h
        .service
        .wait(&b.uuid, Some(Duration::from_secs(3_600)))
        .await;
    assert!(matches!(result, Err(AppError::WaitTimeout(1_000))));
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Queued);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_sees_queued_expiry() {
    let h = Harness::new();
    let _a = h.create("123", 60_000).await;
    let b = h.create("123", 2_000).await;

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let service = h.service.clone();
        let uuid = b.uuid.clone();
        waiters.push(tokio::spawn(async move { service.wait(&uuid, None).await }));
    }

    for waiter in waiters {
        assert!(matches!(
            waiter.await.unwrap(),
            Err(AppError::TicketExpired {
                status: TicketStatus::Expired,
                ..
            })
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_force_clear_wakes_waiters_and_cancels_timers() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;
    let _c = h.create("456", 60_000).await;

    let service = h.service.clone();
    let b_uuid = b.uuid.clone();
    let waiter = tokio::spawn(async move { service.wait(&b_uuid, None).await });
    sleep_ms(10).await;

    let cleared = h.service.force_clear("node-1").await;
    assert_eq!(cleared, 3);

    assert!(matches!(
        waiter.await.unwrap(),
        Err(AppError::TicketExpired {
            status: TicketStatus::Deleted,
            ..
        })
    ));
    assert!(h.service.list("node-1").await.is_empty());
    assert!(h.store.is_empty());

    let stats = h.service.stats().await;
    assert_eq!(stats.armed_timers, 0);
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.deleted, 3);

    // Deleted tickets still answer lookups
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Deleted);

    // Queue is usable again right away
    let fresh = h.create("123", 60_000).await;
    assert_eq!(fresh.status, TicketStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_wait_after_force_clear_reports_deleted() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;

    h.service.force_clear("node-1").await;

    for uuid in [&a.uuid, &b.uuid] {
        match h.service.wait(uuid, None).await {
            Err(AppError::TicketExpired { status, .. }) => {
                assert_eq!(status, TicketStatus::Deleted)
            }
            other => panic!("expected TicketExpired, got {:?}", other),
        }
    }
    assert!(matches!(
        h.service.release(&a.uuid).await,
        Err(AppError::NotActive {
            status: TicketStatus::Deleted,
            ..
        })
    ));

    // Expiry of a cleared ticket stays a no-op
    h.service.on_expire(&b.uuid).await;
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Deleted);

    // Tombstones go with the retention purge
    sleep_ms(1).await;
    assert_eq!(h.service.purge_terminal(h.clock.now_millis()).await.unwrap(), 2);
    assert!(matches!(
        h.service.wait(&a.uuid, None).await,
        Err(AppError::NotFound(_))
    ));
    assert_eq!(h.service.stats().await.queue_keys, 0);
}

#[tokio::test(start_paused = true)]
async fn test_woken_waiter_sees_slot_already_given_up() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;

    let service = h.service.clone();
    let b_uuid = b.uuid.clone();
    let waiter = tokio::spawn(async move { service.wait(&b_uuid, None).await });
    sleep_ms(10).await;

    // b is promoted and finished before the waiter gets to run
    h.service.release(&a.uuid).await.unwrap();
    h.service.release(&b.uuid).await.unwrap();

    match waiter.await.unwrap() {
        Err(AppError::TicketExpired { uuid, status }) => {
            assert_eq!(uuid, b.uuid);
            assert_eq!(status, TicketStatus::Finished);
        }
        other => panic!("expected TicketExpired, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_resource_gate_dropped_with_last_key() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let other = h
        .service
        .create(CreateTicketRequest::new(
            "node-2",
            "vm-create",
            "1",
            h.clock.now_millis() + 60_000,
        ))
        .await
        .unwrap();
    assert_eq!(h.service.gates.len(), 2);

    h.service.release(&a.uuid).await.unwrap();
    sleep_ms(1).await;
    h.service.purge_terminal(h.clock.now_millis()).await.unwrap();

    assert!(!h.service.gates.contains_key("node-1"));
    assert!(h.service.gates.contains_key("node-2"));
    assert_eq!(h.status(&other.uuid).await, TicketStatus::Active);

    // A failed create does not leave a gate behind either
    h.store.fail_next(1);
    assert!(h.service.create(h.request("9", 60_000)).await.is_err());
    assert!(!h.service.gates.contains_key("node-1"));

    let again = h.create("123", 60_000).await;
    assert_eq!(again.status, TicketStatus::Active);
    assert!(h.service.gates.contains_key("node-1"));
}

#[tokio::test(start_paused = true)]
async fn test_force_clear_defers_store_delete() {
    let h = Harness::new();
    h.create("123", 60_000).await;
    h.create("123", 60_000).await;

    h.store.set_unavailable(true);
    assert_eq!(h.service.force_clear("node-1").await, 2);
    assert!(h.service.list("node-1").await.is_empty());
    assert_eq!(h.store.len(), 2);
    assert_eq!(h.service.stats().await.deferred_writes, 1);

    h.store.set_unavailable(false);
    assert_eq!(h.service.sync_store().await.unwrap(), 1);
    assert!(h.store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delete_all_requires_force_when_busy() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;

    assert!(matches!(
        h.service.delete_all("node-1", false).await,
        Err(AppError::QueueBusy(_))
    ));
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Active);

    h.service.release(&a.uuid).await.unwrap();
    assert_eq!(h.service.delete_all("node-1", false).await.unwrap(), 1);
    assert!(h.store.is_empty());
    assert!(h.service.list("node-1").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_create_store_failure_leaves_no_trace() {
    let h = Harness::new();
    h.store.fail_next(1);

    let result = h.service.create(h.request("123", 60_000)).await;
    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    assert!(h.service.list("node-1").await.is_empty());
    assert_eq!(h.service.stats().await.queue_keys, 0);

    // Slot was never taken
    let a = h.create("123", 60_000).await;
    assert_eq!(a.status, TicketStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_release_store_failure_keeps_slot() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;

    h.store.fail_next(1);
    assert!(matches!(
        h.service.release(&a.uuid).await,
        Err(AppError::StoreUnavailable(_))
    ));
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Active);
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Queued);
    assert_eq!(h.store.get(&a.uuid).unwrap().status, TicketStatus::Active);

    h.service.release(&a.uuid).await.unwrap();
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_during_outage_is_replayed() {
    let h = Harness::new();
    let a = h.create("123", 1_000).await;
    let b = h.create("123", 60_000).await;

    h.store.set_unavailable(true);
    sleep_ms(1_001).await;

    // Memory moves on, store lags
    assert_eq!(h.status(&a.uuid).await, TicketStatus::Expired);
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Active);
    assert_eq!(h.store.get(&a.uuid).unwrap().status, TicketStatus::Active);
    assert_eq!(h.service.stats().await.deferred_writes, 2);

    // Synchronous writes refuse while writes are owed
    assert!(matches!(
        h.service.create(h.request("123", 60_000)).await,
        Err(AppError::StoreUnavailable(_))
    ));

    h.store.set_unavailable(false);
    assert_eq!(h.service.sync_store().await.unwrap(), 2);
    assert_eq!(h.store.get(&a.uuid).unwrap().status, TicketStatus::Expired);
    assert_eq!(h.store.get(&b.uuid).unwrap().status, TicketStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_list_and_stats() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    let b = h.create("123", 60_000).await;
    let c = h.create("456", 60_000).await;
    let other = h
        .service
        .create(CreateTicketRequest::new(
            "node-2",
            "vm-create",
            "123",
            h.clock.now_millis() + 60_000,
        ))
        .await
        .unwrap();

    let listed: Vec<String> = h
        .service
        .list("node-1")
        .await
        .into_iter()
        .map(|t| t.uuid)
        .collect();
    assert_eq!(listed, vec![a.uuid.clone(), b.uuid.clone(), c.uuid.clone()]);
    assert!(!listed.contains(&other.uuid));

    let stats = h.service.stats().await;
    assert_eq!(stats.queue_keys, 3);
    assert_eq!(stats.active, 3);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.armed_timers, 4);
}

#[tokio::test(start_paused = true)]
async fn test_purge_terminal_drops_old_tickets() {
    let h = Harness::new();
    let a = h.create("123", 60_000).await;
    h.service.release(&a.uuid).await.unwrap();

    sleep_ms(2_000).await;
    let b = h.create("456", 60_000).await;

    let purged = h.service.purge_terminal(h.clock.now_millis()).await.unwrap();
    assert_eq!(purged, 1);
    assert!(matches!(
        h.service.get(&a.uuid).await,
        Err(AppError::NotFound(_))
    ));
    assert!(h.store.get(&a.uuid).is_none());
    assert_eq!(h.status(&b.uuid).await, TicketStatus::Active);
    assert_eq!(h.service.stats().await.queue_keys, 1);
}

#[tokio::test(start_paused = true)]
async fn test_randomized_interleaving_keeps_invariants() {
    let h = Harness::new();
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let ids = ["1", "2", "3"];
    let mut created: Vec<String> = Vec::new();
    let mut waiters = Vec::new();

    for step in 0..400 {
        match rng.gen_range(0..100) {
            0..=34 => {
                let id = ids[rng.gen_range(0..ids.len())];
                let ttl = rng.gen_range(50..2_000);
                let ticket = h.create(id, ttl).await;
                created.push(ticket.uuid);
            }
            35..=59 if !created.is_empty() => {
                let uuid = &created[rng.gen_range(0..created.len())];
                match h.service.release(uuid).await {
                    Ok(_) | Err(AppError::NotActive { .. }) | Err(AppError::NotFound(_)) => {}
                    Err(e) => panic!("unexpected release error at step {}: {}", step, e),
                }
            }
            60..=69 if !created.is_empty() => {
                let uuid = created[rng.gen_range(0..created.len())].clone();
                let service = h.service.clone();
                waiters.push(tokio::spawn(async move {
                    service.wait(&uuid, Some(Duration::from_millis(500))).await
                }));
            }
            70..=71 => {
                h.service.force_clear("node-1").await;
            }
            _ => sleep_ms(rng.gen_range(0..300)).await,
        }
        h.service.check_invariants().await.unwrap();
    }

    for waiter in waiters {
        match waiter.await.unwrap() {
            Ok(ticket) => assert_eq!(ticket.status, TicketStatus::Active),
            Err(AppError::TicketExpired { .. })
            | Err(AppError::WaitTimeout(_))
            | Err(AppError::NotFound(_)) => {}
            Err(e) => panic!("unexpected wait error: {}", e),
        }
    }

    // Let every deadline pass: nothing stays live
    sleep_ms(5_000).await;
    let stats = h.service.stats().await;
    assert_eq!(stats.active, 0);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.armed_timers, 0);
    h.service.check_invariants().await.unwrap();
}
