use crate::command::first_command_error;
use crate::error::Error;
use crate::hooks::Hook;
use crate::{Client, Cmd, Limiter, Options, ServerError, Value};
use skyhash_proto::ProtocolError;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// One scripted request/reply exchange. When `expect` is set the server
/// reads exactly those bytes and asserts them; the reply is written
/// after `delay`.
struct Exchange {
    expect: Option<Vec<u8>>,
    reply: Vec<u8>,
    delay: Duration,
}

fn reply(bytes: &[u8]) -> Exchange {
    Exchange {
        expect: None,
        reply: bytes.to_vec(),
        delay: Duration::ZERO,
    }
}

fn exchange(expect: &[u8], reply: &[u8]) -> Exchange {
    Exchange {
        expect: Some(expect.to_vec()),
        reply: reply.to_vec(),
        delay: Duration::ZERO,
    }
}

fn slow_reply(bytes: &[u8], delay: Duration) -> Exchange {
    Exchange {
        expect: None,
        reply: bytes.to_vec(),
        delay,
    }
}

/// Serves one scripted connection per inner vec, in accept order.
/// Request reads are strict; reply writes tolerate a client that
/// already hung up.
async fn spawn_server(scripts: Vec<Vec<Exchange>>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
    let handle = tokio::spawn(async move {
        for script in scripts {
            let (mut sock, _) = listener.accept().await.unwrap();
            for ex in script {
                if let Some(expected) = &ex.expect {
                    let mut buf = vec![0u8; expected.len()];
                    sock.read_exact(&mut buf).await.unwrap();
                    assert_eq!(
                        String::from_utf8_lossy(&buf),
                        String::from_utf8_lossy(expected),
                        "request bytes mismatch"
                    );
                }
                if !ex.delay.is_zero() {
                    sleep(ex.delay).await;
                }
                let _ = sock.write_all(&ex.reply).await;
            }
        }
    });
    (addr, handle)
}

fn test_options(addr: &str) -> Options {
    Options {
        addr: addr.to_owned(),
        max_retries: Some(0),
        // Keep the reaper quiet unless a test turns it on.
        idle_check_frequency: Some(Duration::ZERO),
        ..Options::default()
    }
}

fn test_client(addr: &str) -> Client {
    Client::new(test_options(addr))
}

const OK: &[u8] = b"*1\n!1\n0\n";
const NIL: &[u8] = b"*1\n!1\n1\n";
const OVERWRITE: &[u8] = b"*1\n!1\n2\n";
const HEY: &[u8] = b"*1\n+4\nHEY!\n";

#[tokio::test]
async fn set_round_trips_on_the_wire() {
    let (addr, server) = spawn_server(vec![vec![exchange(
        b"*1\n~3\n3\nSET\n3\nkey\n5\nvalue\n",
        OK,
    )]])
    .await;

    let client = test_client(&addr);
    client.set("key", "value").await.unwrap();
    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn get_missing_yields_the_nil_sentinel() {
    let (addr, server) = spawn_server(vec![vec![reply(NIL), reply(NIL)]]).await;
    let client = test_client(&addr);

    let err = client.get("missing").await.unwrap_err();
    assert!(err.is_nil());
    assert_eq!(err, Error::from(ServerError::Nil));

    // Through the raw path: the error is on the command, the value slot
    // stays nil, and the textual view of nil is the empty string.
    let cmd = client.run(vec!["GET".into(), "missing".into()]).await;
    assert!(cmd.err().unwrap().is_nil());
    assert_eq!(cmd.value(), &Value::Nil);
    assert_eq!(cmd.value().as_text().unwrap(), "");

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn overwriting_set_reports_the_typed_error() {
    let (addr, server) = spawn_server(vec![vec![reply(OK), reply(OVERWRITE)]]).await;
    let client = test_client(&addr);

    client.set("key", "v").await.unwrap();
    let err = client.set("key", "v").await.unwrap_err();
    assert_eq!(err.server_error(), Some(ServerError::Overwrite));

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn pipelined_heya_batches_into_one_frame() {
    let mut request = b"*10\n".to_vec();
    let mut response = b"*10\n".to_vec();
    for digit in 0..10 {
        request.extend_from_slice(format!("~2\n4\nHEYA\n1\n{digit}\n").as_bytes());
        response.extend_from_slice(format!("+1\n{digit}\n").as_bytes());
    }
    let (addr, server) = spawn_server(vec![vec![exchange(&request, &response)]]).await;

    let client = test_client(&addr);
    let mut pipe = client.pipeline();
    for digit in 0..10 {
        pipe.push(Cmd::heya(&digit.to_string()));
    }
    assert_eq!(pipe.len(), 10);

    let cmds = pipe.exec().await.unwrap();
    assert_eq!(cmds.len(), 10);
    for (digit, cmd) in cmds.iter().enumerate() {
        assert_eq!(cmd.text().unwrap(), digit.to_string());
    }
    assert!(first_command_error(&cmds).is_ok());

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn pipeline_keeps_element_errors_in_their_slots() {
    // Three queued lookups; the middle key is missing.
    let (addr, server) =
        spawn_server(vec![vec![reply(b"*3\n+1\na\n!1\n1\n+1\nc\n")]]).await;
    let client = test_client(&addr);

    let cmds = client
        .pipelined(|pipe| {
            pipe.push(Cmd::get("k1"));
            pipe.push(Cmd::get("k2"));
            pipe.push(Cmd::get("k3"));
        })
        .await
        .unwrap();

    assert_eq!(cmds[0].text().unwrap(), "a");
    assert!(cmds[1].err().unwrap().is_nil());
    assert_eq!(cmds[2].text().unwrap(), "c");
    assert!(first_command_error(&cmds).unwrap_err().is_nil());

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn pipeline_count_mismatch_fails_every_command() {
    let (addr, server) = spawn_server(vec![vec![reply(b"*2\n!1\n0\n!1\n0\n")]]).await;
    let client = test_client(&addr);

    let mut cmds = vec![Cmd::heya("a"), Cmd::heya("b"), Cmd::heya("c")];
    let err = client.process_pipeline(&mut cmds).await.unwrap_err();
    assert_eq!(
        err,
        Error::CountMismatch {
            expected: 3,
            got: 2
        }
    );
    for cmd in &cmds {
        assert_eq!(cmd.err(), Some(&err));
    }

    client.close().unwrap();
    server.abort();
}

#[tokio::test]
async fn single_reply_count_mismatch_is_an_error() {
    let (addr, server) = spawn_server(vec![vec![reply(b"*2\n!1\n0\n!1\n0\n")]]).await;
    let client = test_client(&addr);

    let err = client.heya("").await.unwrap_err();
    assert_eq!(err, Error::CountMismatch { expected: 1, got: 2 });

    client.close().unwrap();
    server.abort();
}

#[tokio::test]
async fn retries_with_backoff_until_the_dialer_succeeds() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY)]]).await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let dialer_attempts = Arc::clone(&attempts);
    let target = addr.clone();

    let mut opt = Options {
        addr,
        max_retries: Some(2),
        idle_check_frequency: Some(Duration::ZERO),
        ..Options::default()
    };
    opt.dialer = Some(Arc::new(move |_network, _addr| {
        let attempt = dialer_attempts.fetch_add(1, Ordering::SeqCst);
        let target = target.clone();
        Box::pin(async move {
            if attempt < 2 {
                return Err(Error::Protocol(ProtocolError::Io {
                    context: "failed to dial",
                    kind: io::ErrorKind::ConnectionRefused,
                    message: "scripted refusal".to_owned(),
                }));
            }
            let stream = tokio::net::TcpStream::connect(&target)
                .await
                .map_err(|e| Error::Protocol(ProtocolError::Io {
                    context: "failed to dial",
                    kind: e.kind(),
                    message: e.to_string(),
                }))?;
            Ok(crate::Stream::Tcp(stream))
        })
    }));

    let client = Client::new(opt);
    let start = Instant::now();
    assert_eq!(client.heya("").await.unwrap(), "HEY!");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // First backoff is at least the minimum, the second at least
    // min(2 * minimum, maximum).
    let floor = Duration::from_millis(8) + Duration::from_millis(16);
    assert!(start.elapsed() >= floor, "elapsed {:?}", start.elapsed());

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn pool_exhaustion_times_out_the_second_caller() {
    let (addr, server) = spawn_server(vec![vec![slow_reply(
        HEY,
        Duration::from_millis(300),
    )]])
    .await;

    let mut opt = test_options(&addr);
    opt.pool_size = Some(1);
    opt.min_idle_conns = 1;
    opt.pool_timeout = Some(Duration::from_millis(50));
    let client = Client::new(opt);

    // Let warm-up park the one connection so the slow caller's checkout
    // is a pool hit.
    for _ in 0..50 {
        if client.pool_stats().idle_conns == 1 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(client.pool_stats().idle_conns, 1);

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.heya("").await })
    };
    sleep(Duration::from_millis(30)).await;

    let err = client.heya("").await.unwrap_err();
    assert_eq!(err, Error::PoolTimeout);

    assert_eq!(slow.await.unwrap().unwrap(), "HEY!");

    let stats = client.pool_stats();
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.hits, 1);

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent_and_fails_later_calls() {
    let client = test_client("localhost:1");
    client.close().unwrap();
    client.close().unwrap();

    let err = client.heya("").await.unwrap_err();
    assert_eq!(err, Error::Closed);
}

struct RecordingHook {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail_before: bool,
    fail_after: bool,
}

impl Hook for RecordingHook {
    fn before_process(&self, _cmd: &mut Cmd) -> Result<(), Error> {
        self.log.lock().unwrap().push(format!("before {}", self.name));
        if self.fail_before {
            return Err(Error::RateLimited(format!("{} before", self.name)));
        }
        Ok(())
    }

    fn after_process(&self, _cmd: &mut Cmd) -> Result<(), Error> {
        self.log.lock().unwrap().push(format!("after {}", self.name));
        if self.fail_after {
            return Err(Error::RateLimited(format!("{} after", self.name)));
        }
        Ok(())
    }
}

#[tokio::test]
async fn hooks_run_in_stack_order() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY)]]).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut client = test_client(&addr);
    client.add_hook(Arc::new(RecordingHook {
        name: "a",
        log: Arc::clone(&log),
        fail_before: false,
        fail_after: false,
    }));
    client.add_hook(Arc::new(RecordingHook {
        name: "b",
        log: Arc::clone(&log),
        fail_before: false,
        fail_after: false,
    }));

    client.heya("").await.unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before a", "before b", "after b", "after a"]
    );

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn failing_before_hook_skips_the_network() {
    // Unroutable address proves the command never dials: the only error
    // that can surface is the hook's own.
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut client = test_client("localhost:1");
    client.add_hook(Arc::new(RecordingHook {
        name: "a",
        log: Arc::clone(&log),
        fail_before: false,
        fail_after: false,
    }));
    client.add_hook(Arc::new(RecordingHook {
        name: "b",
        log: Arc::clone(&log),
        fail_before: true,
        fail_after: false,
    }));

    let mut cmd = Cmd::heya("");
    let err = client.process(&mut cmd).await.unwrap_err();
    assert_eq!(err, Error::RateLimited("b before".to_owned()));
    assert_eq!(cmd.err(), Some(&err));

    // b's before failed, so only a's after fires.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before a", "before b", "after a"]
    );
}

#[tokio::test]
async fn failing_after_hook_overwrites_the_command_error() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY)]]).await;
    let mut client = test_client(&addr);
    client.add_hook(Arc::new(RecordingHook {
        name: "a",
        log: Arc::new(Mutex::new(Vec::new())),
        fail_before: false,
        fail_after: true,
    }));

    let mut cmd = Cmd::heya("");
    let err = client.process(&mut cmd).await.unwrap_err();
    assert_eq!(err, Error::RateLimited("a after".to_owned()));
    assert_eq!(cmd.err(), Some(&err));
    // The reply itself decoded fine before the hook overwrote the error.
    assert_eq!(cmd.value().as_text().unwrap(), "HEY!");

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn binary_values_round_trip_byte_identically() {
    let payload = b"a\nb\r\n";
    let mut set_frame = b"*1\n~3\n3\nSET\n3\nbin\n5\n".to_vec();
    set_frame.extend_from_slice(payload);
    set_frame.push(b'\n');

    let mut get_reply = b"*1\n?5\n".to_vec();
    get_reply.extend_from_slice(payload);
    get_reply.push(b'\n');

    let (addr, server) =
        spawn_server(vec![vec![exchange(&set_frame, OK), reply(&get_reply)]]).await;
    let client = test_client(&addr);

    client
        .set("bin", payload.as_slice())
        .await
        .unwrap();
    assert_eq!(client.get_bytes("bin").await.unwrap(), payload.to_vec());

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn init_runs_auth_and_table_selection_once() {
    let (addr, server) = spawn_server(vec![vec![
        exchange(b"*1\n~3\n4\nAUTH\n4\nroot\n3\ntok\n", OK),
        exchange(b"*1\n~2\n3\nUSE\n12\ndefault:test\n", OK),
        exchange(b"*1\n~1\n4\nHEYA\n", HEY),
        exchange(b"*1\n~1\n4\nHEYA\n", HEY),
    ]])
    .await;

    let mut opt = test_options(&addr);
    opt.username = "root".to_owned();
    opt.token = "tok".to_owned();
    opt.table = "test".to_owned();
    let client = Client::new(opt);

    // Two commands, one connection: init must run exactly once.
    assert_eq!(client.heya("").await.unwrap(), "HEY!");
    assert_eq!(client.heya("").await.unwrap(), "HEY!");

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn on_connect_fires_after_init() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY)]]).await;
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);

    let mut opt = test_options(&addr);
    opt.on_connect = Some(Arc::new(move |_conn| {
        let flag = Arc::clone(&flag);
        Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
    }));
    let client = Client::new(opt);

    client.heya("").await.unwrap();
    assert!(fired.load(Ordering::SeqCst));

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn dedicated_conn_sticks_to_one_connection() {
    // One scripted connection serves the dedicated client twice and the
    // pooled client once after release.
    let (addr, server) = spawn_server(vec![vec![
        reply(HEY),
        reply(HEY),
        reply(HEY),
    ]])
    .await;
    let client = test_client(&addr);

    let dedicated = client.conn();
    assert_eq!(dedicated.heya("").await.unwrap(), "HEY!");
    assert_eq!(dedicated.heya("").await.unwrap(), "HEY!");
    dedicated.close().unwrap();

    // Released back to the pool: the pooled client reuses it.
    assert_eq!(client.heya("").await.unwrap(), "HEY!");
    let stats = client.pool_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn read_deadline_marks_the_connection_bad() {
    let (addr, server) = spawn_server(vec![vec![slow_reply(
        HEY,
        Duration::from_millis(300),
    )]])
    .await;

    let mut opt = test_options(&addr);
    opt.read_timeout = Some(Duration::from_millis(40));
    let client = Client::new(opt);

    let err = client.heya("").await.unwrap_err();
    assert_eq!(err, Error::Timeout("read"));
    assert!(err.is_timeout());

    // The connection's state is unknown; it must not be pooled again.
    assert_eq!(client.pool_stats().total_conns, 0);

    client.close().unwrap();
    server.abort();
}

#[tokio::test]
async fn cancelled_command_evicts_its_connection() {
    let (addr, server) = spawn_server(vec![vec![slow_reply(
        HEY,
        Duration::from_millis(500),
    )]])
    .await;
    let client = test_client(&addr);

    let result = tokio::time::timeout(Duration::from_millis(50), client.heya("")).await;
    assert!(result.is_err());

    // The dropped in-flight command released its connection as bad.
    assert_eq!(client.pool_stats().total_conns, 0);

    client.close().unwrap();
    server.abort();
}

#[tokio::test]
async fn pool_counters_track_live_connections() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY), reply(HEY)]]).await;
    let client = test_client(&addr);

    client.heya("").await.unwrap();
    let stats = client.pool_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.total_conns, 1);
    assert_eq!(stats.idle_conns, 1);

    client.heya("").await.unwrap();
    let stats = client.pool_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.total_conns, 1);

    client.close().unwrap();
    let stats = client.pool_stats();
    assert_eq!(stats.total_conns, 0);
    assert_eq!(stats.idle_conns, 0);
    server.await.unwrap();
}

#[tokio::test]
async fn warmup_dials_min_idle_connections() {
    let (addr, server) = spawn_server(vec![vec![], vec![]]).await;

    let mut opt = test_options(&addr);
    opt.min_idle_conns = 2;
    opt.pool_size = Some(4);
    let client = Client::new(opt);

    // Warm-up dials in the background.
    for _ in 0..50 {
        if client.pool_stats().idle_conns == 2 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    let stats = client.pool_stats();
    assert_eq!(stats.idle_conns, 2);
    assert_eq!(stats.total_conns, 2);

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn reaper_closes_idle_connections() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY)]]).await;

    let mut opt = test_options(&addr);
    opt.idle_timeout = Some(Duration::from_millis(50));
    opt.idle_check_frequency = Some(Duration::from_millis(25));
    let client = Client::new(opt);

    client.heya("").await.unwrap();
    assert_eq!(client.pool_stats().total_conns, 1);

    for _ in 0..40 {
        if client.pool_stats().total_conns == 0 {
            break;
        }
        sleep(Duration::from_millis(25)).await;
    }
    let stats = client.pool_stats();
    assert_eq!(stats.total_conns, 0);
    assert!(stats.stale_conns >= 1);

    client.close().unwrap();
    server.await.unwrap();
}

struct DenyingLimiter {
    deny: AtomicBool,
    reports: AtomicUsize,
}

impl Limiter for DenyingLimiter {
    fn allow(&self) -> Result<(), Error> {
        if self.deny.load(Ordering::SeqCst) {
            Err(Error::RateLimited("breaker open".to_owned()))
        } else {
            Ok(())
        }
    }

    fn report_result(&self, _result: Result<(), &Error>) {
        self.reports.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn limiter_gates_and_observes_operations() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY)]]).await;
    let limiter = Arc::new(DenyingLimiter {
        deny: AtomicBool::new(true),
        reports: AtomicUsize::new(0),
    });

    let mut opt = test_options(&addr);
    opt.limiter = Some(limiter.clone());
    let client = Client::new(opt);

    let err = client.heya("").await.unwrap_err();
    assert_eq!(err, Error::RateLimited("breaker open".to_owned()));

    limiter.deny.store(false, Ordering::SeqCst);
    client.heya("").await.unwrap();
    assert!(limiter.reports.load(Ordering::SeqCst) >= 1);

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn with_timeout_clone_shares_the_pool() {
    let (addr, server) = spawn_server(vec![vec![reply(HEY), reply(HEY)]]).await;
    let client = test_client(&addr);

    client.heya("").await.unwrap();

    let tighter = client.with_timeout(Duration::from_secs(1));
    assert_eq!(
        tighter.options().read_timeout,
        Some(Duration::from_secs(1))
    );
    tighter.heya("").await.unwrap();

    // Same pool underneath: the clone's command reused the connection.
    assert_eq!(client.pool_stats().hits, 1);

    client.close().unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn client_displays_addr_and_table() {
    let mut opt = test_options("localhost:2003");
    opt.table = "test15".to_owned();
    let client = Client::new(opt);
    assert_eq!(
        client.to_string(),
        "Skyhash<localhost:2003 table:default:test15>"
    );
    client.close().unwrap();
}
