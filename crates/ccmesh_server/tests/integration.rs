//! End-to-end scenarios exercising the job server, a worker, and the client
//! dispatch fabric together over real loopback sockets.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ccmesh_client::{DispatchConfig, StaticLocator};
use ccmesh_config::WorkerConfig;
use ccmesh_modules::sleepmod::SleepModule;
use ccmesh_net::connect_any;
use ccmesh_protocol::{Address, Key, Role, WorkerDescriptor};
use tokio::net::TcpListener;

const KEEPALIVE: Duration = Duration::from_secs(60);

/// Finds a free ephemeral port by binding then immediately releasing it, so
/// `ccmesh_server::run`/`ccmesh_worker::run` (which re-bind it themselves)
/// don't race an already-listening socket.
async fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("127.0.0.1:{}", addr.port())
}

async fn spawn_job_server() -> String {
    let addr = free_addr().await;
    let bind = addr.clone();
    tokio::spawn(async move {
        ccmesh_server::run(bind, KEEPALIVE).await.unwrap();
    });
    // The server's accept loop re-resolves on a 1s poll; give it a moment.
    tokio::time::sleep(Duration::from_millis(150)).await;
    addr
}

fn worker_config(job_server_addr: &str, bind_addr: &str, slots: usize) -> WorkerConfig {
    WorkerConfig {
        job_server_addr: job_server_addr.to_string(),
        bind_addr: bind_addr.to_string(),
        log_addr: None,
        slots: Some(slots),
        // The worker advertises `hostname` (not the bind address) as its
        // connect-back host (see DESIGN.md); loopback tests need that to
        // actually resolve, so it stands in for a real cluster hostname here.
        hostname: "127.0.0.1".to_string(),
        server_timeout: Duration::from_secs(5),
        log_timeout: Duration::from_secs(5),
        keepalive_timeout: KEEPALIVE,
        compilers: Vec::new(),
        log_level: "info".to_string(),
        verbose: false,
    }
}

async fn spawn_worker(job_server_addr: &str, slots: usize) -> String {
    let bind_addr = free_addr().await;
    let config = worker_config(job_server_addr, &bind_addr, slots);
    tokio::spawn(async move {
        ccmesh_worker::run(config).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(150)).await;
    bind_addr
}

fn sleep_dispatch(job_server_addr: &str, hostname: &str) -> (StaticLocator, SleepModule, DispatchConfig) {
    let (host, port) = job_server_addr.rsplit_once(':').unwrap();
    let locator = StaticLocator::single(Address::new(host, port.parse().unwrap()));
    let module = SleepModule;
    let config = DispatchConfig {
        hostname: hostname.to_string(),
        key: Key::new("sleep", b""),
        server_timeout: Duration::from_secs(2),
        worker_timeout: Duration::from_secs(2),
        keepalive_timeout: KEEPALIVE,
    };
    (locator, module, config)
}

/// Scenario: a single worker services a single client's job start to finish.
#[tokio::test]
async fn single_node_dispatch_loop() {
    let server_addr = spawn_job_server().await;
    spawn_worker(&server_addr, 2).await;

    let (locator, module, config) = sleep_dispatch(&server_addr, "client-01");
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        ccmesh_client::run(&locator, &module, &0u64.to_le_bytes(), config),
    )
    .await
    .expect("dispatch did not complete in time")
    .expect("dispatch failed");

    assert_eq!(result, b"ok".to_vec());
}

/// Scenario: the first worker assigned to a job is unreachable (already
/// gone); the client reports failure and re-requests, and a second, healthy
/// worker that only comes up afterwards completes the job.
#[tokio::test]
async fn retries_past_an_unreachable_worker() {
    let server_addr = spawn_job_server().await;

    // Manually advertise a worker whose address nobody is listening on, so
    // any client connect attempt against it fails outright.
    let dead_port = free_addr().await; // bound-then-dropped: guaranteed refused
    let (dead_host, dead_port) = dead_port.rsplit_once(':').unwrap();
    let conn = connect_any(
        &[{
            let (h, p) = server_addr.rsplit_once(':').unwrap();
            Address::new(h, p.parse().unwrap())
        }],
        Duration::from_secs(2),
        None,
    )
    .await
    .unwrap();
    let conn = Arc::new(conn);
    conn.send(Role::Worker.as_bytes()).await.unwrap();
    let descriptor = WorkerDescriptor {
        hostname: "ghost".to_string(),
        keys: vec![Key::new("sleep", b"")],
        addrs: vec![Address::new(dead_host, dead_port.parse().unwrap())],
        max_slots: 4,
    };
    conn.send(&descriptor.encode()).await.unwrap();
    // One slot report makes this worker briefly available to the matchmaker.
    conn.send(&ccmesh_protocol::wire::build(|buf| ccmesh_protocol::wire::write_f64(buf, 4.0)))
        .await
        .unwrap();

    let (locator, module, config) = sleep_dispatch(&server_addr, "client-01");
    let dispatch = tokio::spawn(ccmesh_client::run(&locator, &module, &0u64.to_le_bytes(), config));

    // Give the dispatch loop time to get assigned the dead worker and fail.
    tokio::time::sleep(Duration::from_millis(300)).await;

    spawn_worker(&server_addr, 2).await;

    let result = tokio::time::timeout(Duration::from_secs(5), dispatch)
        .await
        .expect("dispatch did not complete in time")
        .unwrap()
        .expect("dispatch should eventually succeed against the real worker");
    assert_eq!(result, b"ok".to_vec());
}

/// Scenario: with one worker slot, two clients queued on the same key are
/// serviced in the order they requested a worker.
#[tokio::test]
async fn fifo_ordering_across_two_clients() {
    let server_addr = spawn_job_server().await;
    spawn_worker(&server_addr, 1).await;

    let order = Arc::new(std::sync::Mutex::new(Vec::<u32>::new()));

    // `job_secs` keeps the first job occupying the worker's only slot long
    // enough that the second job, submitted shortly after, has to queue
    // behind it rather than racing it to the worker.
    let run_client = |id: u32, delay_ms: u64, job_secs: u64| {
        let server_addr = server_addr.clone();
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let (locator, module, config) = sleep_dispatch(&server_addr, &format!("client-{id}"));
            let result = ccmesh_client::run(&locator, &module, &job_secs.to_le_bytes(), config)
                .await
                .unwrap();
            assert_eq!(result, b"ok".to_vec());
            order.lock().unwrap().push(id);
        })
    };

    let first = run_client(1, 0, 1);
    let second = run_client(2, 80, 0);

    tokio::time::timeout(Duration::from_secs(5), async {
        first.await.unwrap();
        second.await.unwrap();
    })
    .await
    .expect("both jobs should complete");

    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
}

/// Scenario: a worker with a single slot genuinely serializes two
/// concurrently-submitted jobs rather than running them in parallel.
#[tokio::test]
async fn single_slot_worker_serializes_concurrent_jobs() {
    let server_addr = spawn_job_server().await;
    spawn_worker(&server_addr, 1).await;

    const SLEEP_SECS: u64 = 1;
    let start = Instant::now();

    let run_one = |id: u32| {
        let server_addr = server_addr.clone();
        tokio::spawn(async move {
            let (locator, module, config) = sleep_dispatch(&server_addr, &format!("client-{id}"));
            ccmesh_client::run(&locator, &module, &SLEEP_SECS.to_le_bytes(), config)
                .await
                .unwrap()
        })
    };

    let a = run_one(1);
    let b = run_one(2);
    tokio::time::timeout(Duration::from_secs(10), async {
        a.await.unwrap();
        b.await.unwrap();
    })
    .await
    .expect("both jobs should eventually complete");

    // Two 1s jobs on one slot must take at least ~2s; if the worker let them
    // run concurrently this would finish in ~1s.
    assert!(start.elapsed() >= Duration::from_millis(1900), "jobs ran concurrently on a single slot");
}

/// Scenario: a connecting peer that speaks the wrong protocol version is
/// rejected during the handshake and never reaches job/worker handling.
#[tokio::test]
async fn version_skew_is_rejected_at_handshake() {
    let server_addr = spawn_job_server().await;
    let (host, port) = server_addr.rsplit_once(':').unwrap();
    let mut stream = tokio::net::TcpStream::connect((host, port.parse::<u16>().unwrap()))
        .await
        .unwrap();

    let mut bad_handshake = ccmesh_protocol::encode_handshake();
    bad_handshake[4..].copy_from_slice(&999u32.to_le_bytes());
    use tokio::io::AsyncWriteExt;
    stream.write_all(&bad_handshake).await.unwrap();

    // The server's accept task validates the handshake and drops the
    // connection without ever reading a role tag; our write-then-read
    // should observe EOF rather than the server waiting on us forever.
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close promptly on bad handshake")
        .unwrap();
    assert_eq!(n, 0, "expected EOF after a rejected handshake");
}

/// Scenario: once the only worker ever connected for a key disconnects for
/// good, any job still queued on that key gets its connection torn down
/// instead of waiting forever for a worker that will never come.
#[tokio::test]
async fn last_worker_for_a_key_leaving_orphans_queued_jobs() {
    let server_addr = spawn_job_server().await;

    let (locator, module, config) = sleep_dispatch(&server_addr, "client-01");
    let dispatch = tokio::spawn(async move {
        ccmesh_client::run(&locator, &module, &0u64.to_le_bytes(), config).await
    });

    // Let the client register and block waiting for a worker assignment.
    tokio::time::sleep(Duration::from_millis(150)).await;

    // A worker connects and advertises the key, then crashes before ever
    // reporting availability (so it was "connected" but never "available").
    let conn = connect_any(
        &[{
            let (h, p) = server_addr.rsplit_once(':').unwrap();
            Address::new(h, p.parse().unwrap())
        }],
        Duration::from_secs(2),
        None,
    )
    .await
    .unwrap();
    conn.send(Role::Worker.as_bytes()).await.unwrap();
    let descriptor = WorkerDescriptor {
        hostname: "flaky".to_string(),
        keys: vec![Key::new("sleep", b"")],
        addrs: vec![Address::new("127.0.0.1", 1)],
        max_slots: 1,
    };
    conn.send(&descriptor.encode()).await.unwrap();
    conn.nuke().await;

    let result = tokio::time::timeout(Duration::from_secs(5), dispatch)
        .await
        .expect("dispatch should observe the orphaning promptly")
        .unwrap();
    assert!(result.is_err(), "job connection should have been nuked with no worker left for its key");
}
