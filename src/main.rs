//! `log2fluent`: run a command and forward its output to Fluent.

use std::{
    collections::BTreeMap,
    io::{self, PipeReader, PipeWriter},
    process::{Command, ExitCode, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use log2fluent::{
    DEFAULT_QUEUE_CAPACITY, Forwarder, ForwarderHandle,
    fluent::{FluentSink, FluentSinkConfig, parse_address, parse_extra_attrs},
};

const EXIT_FAILURE: u8 = 1;
const EXIT_SIGNALLED: u8 = 254;
/// How long forwarders may keep draining after the child exits.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Execute a command, capture its stdout and/or stderr, and forward each
/// line to Fluent via the Fluent Forward protocol.
#[derive(Debug, Parser)]
#[command(name = "log2fluent", version)]
struct Cli {
    /// The log identifier, e.g. service name or container ID. Defaults to the
    /// stream name
    #[arg(long)]
    tag: Option<String>,

    /// Collector address for the command's stdout: [tcp|tls|unix]://addr,
    /// or host:port for plain TCP
    #[arg(long, value_name = "ADDR")]
    stdout: Option<String>,

    /// Collector address for the command's stderr: [tcp|tls|unix]://addr,
    /// or host:port for plain TCP
    #[arg(long, value_name = "ADDR")]
    stderr: Option<String>,

    /// Lines buffered per stream before new lines are dropped
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    buflen: usize,

    /// Comma separated extra record attributes, e.g. key1=val1,key2=val2
    #[arg(long, value_name = "K=V,...", default_value = "")]
    extra: String,

    /// Skip certificate verification for tls:// addresses
    #[arg(long)]
    tls_insecure: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// The command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

impl Cli {
    fn sink_for(
        &self,
        stream: &str,
        addr: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<FluentSink> {
        let transport = parse_address(addr)
            .with_context(|| format!("invalid --{stream} address '{addr}'"))?
            .with_insecure_tls(self.tls_insecure);
        let tag = self
            .tag
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .unwrap_or(stream);
        let config = FluentSinkConfig::new(transport, tag, stream).with_extra(extra.clone());
        FluentSink::new(config).with_context(|| format!("invalid {stream} sink configuration"))
    }

    /// A [`Capture`] for `stream` when it has a collector address.
    fn capture(
        &self,
        stream: &str,
        addr: Option<&str>,
        extra: &BTreeMap<String, String>,
    ) -> Result<Option<Capture>> {
        addr.map(|addr| Capture::new(stream, self.buflen, self.sink_for(stream, addr, extra)?))
            .transpose()
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// A forwarder whose source is the read end of a fresh pipe. `writer` is
/// handed to the child.
struct Capture {
    forwarder: Forwarder<PipeReader, FluentSink>,
    writer: PipeWriter,
}

impl Capture {
    /// Build the forwarder, which makes its first connect attempt here.
    fn new(stream: &str, buflen: usize, sink: FluentSink) -> Result<Self> {
        let (reader, writer) =
            io::pipe().with_context(|| format!("error creating {stream} pipe"))?;
        Ok(Self {
            forwarder: Forwarder::new(stream, buflen, reader, sink),
            writer,
        })
    }

    /// The child's end of the stream and the forwarder, if one is wanted.
    fn split(capture: Option<Self>) -> (Stdio, Option<Forwarder<PipeReader, FluentSink>>) {
        match capture {
            Some(Self { forwarder, writer }) => (Stdio::from(writer), Some(forwarder)),
            None => (Stdio::inherit(), None),
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let extra = parse_extra_attrs(&cli.extra);
    // Forwarders make their first connect before the child starts.
    let (stdout, stdout_forwarder) =
        Capture::split(cli.capture("stdout", cli.stdout.as_deref(), &extra)?);
    let (stderr, stderr_forwarder) =
        Capture::split(cli.capture("stderr", cli.stderr.as_deref(), &extra)?);

    let (program, args) = cli.command.split_first().context("missing command")?;
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(stdout)
        .stderr(stderr);
    let spawned = command.spawn();
    // `command` holds our copy of each write end; readers see EOF only once
    // it is gone.
    drop(command);
    let mut child = spawned.with_context(|| format!("error executing {program}"))?;

    let handles: Vec<ForwarderHandle> = [stdout_forwarder, stderr_forwarder]
        .into_iter()
        .flatten()
        .map(Forwarder::forward)
        .collect();

    let status = child.wait().context("error waiting for child process")?;
    drain(&handles, DRAIN_GRACE);
    Ok(exit_code(status))
}

/// Wait up to `grace` for every forwarder to finish.
fn drain(handles: &[ForwarderHandle], grace: Duration) {
    let deadline = Instant::now() + grace;
    while !handles.iter().all(ForwarderHandle::is_finished) {
        if Instant::now() >= deadline {
            warn!("forwarders still running after {grace:?}; exiting without them");
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    for handle in handles {
        let summary = handle.join();
        debug!("{}: {summary:?}", handle.label());
    }
}

fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(EXIT_FAILURE)),
        None => {
            info!("child process terminated due to signal: {status}");
            ExitCode::from(EXIT_SIGNALLED)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use log2fluent::ConnectionState;
    use rstest::{fixture, rstest};
    use std::{
        io::Write,
        net::{SocketAddr, TcpListener},
        sync::mpsc,
    };

    type Entry = (String, i64, BTreeMap<String, String>);

    #[fixture]
    fn collector() -> (SocketAddr, mpsc::Receiver<Entry>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener");
        let addr = listener.local_addr().expect("listener has address");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept connection");
            while let Ok(entry) = rmp_serde::from_read::<_, Entry>(&mut stream) {
                if tx.send(entry).is_err() {
                    break;
                }
            }
        });
        (addr, rx)
    }

    #[rstest]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    fn options_before_command_are_ours() {
        let cli = Cli::parse_from([
            "log2fluent",
            "--stdout",
            "tcp://localhost:24224",
            "--buflen",
            "16",
            "--extra",
            "a=1",
            "my-app",
            "--stdout",
            "-v",
        ]);
        assert_eq!(cli.stdout.as_deref(), Some("tcp://localhost:24224"));
        assert_eq!(cli.stderr, None);
        assert_eq!(cli.buflen, 16);
        assert_eq!(cli.extra, "a=1");
        assert_eq!(cli.command, ["my-app", "--stdout", "-v"]);
    }

    #[rstest]
    fn defaults_apply() {
        let cli = Cli::parse_from(["log2fluent", "true"]);
        assert_eq!(cli.buflen, DEFAULT_QUEUE_CAPACITY);
        assert!(!cli.debug);
        assert!(!cli.tls_insecure);
        assert_eq!(cli.tag, None);
    }

    #[rstest]
    fn command_is_required() {
        let err = Cli::try_parse_from(["log2fluent", "--debug"]).expect_err("usage error");
        assert_eq!(err.exit_code(), 2);
    }

    #[rstest]
    #[case(None, "stdout")]
    #[case(Some(""), "stdout")]
    #[case(Some("svc"), "svc")]
    fn tag_defaults_to_stream_name(#[case] tag: Option<&str>, #[case] expected: &str) {
        let mut cli = Cli::parse_from(["log2fluent", "true"]);
        cli.tag = tag.map(str::to_owned);
        let sink = cli
            .sink_for("stdout", "localhost:24224", &BTreeMap::new())
            .expect("valid sink");
        assert_eq!(sink.config().tag, expected);
        assert_eq!(sink.config().stream, "stdout");
    }

    #[rstest]
    fn bad_address_is_a_configuration_error() {
        let cli = Cli::parse_from(["log2fluent", "true"]);
        let err = cli
            .sink_for("stderr", "udp://localhost:24224", &BTreeMap::new())
            .expect_err("udp is unsupported");
        assert!(format!("{err:#}").contains("--stderr"));
    }

    #[rstest]
    #[case("stdout")]
    #[case("stderr")]
    fn address_help_lists_supported_schemes(#[case] stream: &str) {
        let command = Cli::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == stream)
            .expect("argument exists");
        let help = arg.get_help().expect("argument has help").to_string();
        assert!(help.contains("[tcp|tls|unix]://"), "{help}");
    }

    #[rstest]
    fn capture_connects_before_anything_is_written(
        collector: (SocketAddr, mpsc::Receiver<Entry>),
    ) {
        let (addr, entries) = collector;
        let cli = Cli::parse_from(["log2fluent", "true"]);
        let capture = cli
            .capture("stdout", Some(&format!("tcp://{addr}")), &BTreeMap::new())
            .expect("valid capture")
            .expect("address given");
        assert_eq!(capture.forwarder.state(), ConnectionState::Connected);

        let Capture {
            forwarder,
            mut writer,
        } = capture;
        writer.write_all(b"early line\n").expect("pipe write");
        drop(writer);
        let summary = forwarder.forward().join();

        assert_eq!(summary.delivery.map(|d| d.sent), Some(1));
        let (tag, _, record) = entries
            .recv_timeout(Duration::from_secs(5))
            .expect("entry");
        assert_eq!(tag, "stdout");
        assert_eq!(record["log"], "early line");
    }

    #[rstest]
    fn no_address_means_no_capture() {
        let cli = Cli::parse_from(["log2fluent", "true"]);
        let capture = cli
            .capture("stderr", None, &BTreeMap::new())
            .expect("nothing to build");
        assert!(capture.is_none());
        assert!(Capture::split(capture).1.is_none());
    }

    #[cfg(unix)]
    #[rstest]
    fn run_forwards_child_stdout_and_mirrors_exit(
        collector: (SocketAddr, mpsc::Receiver<Entry>),
    ) {
        let (addr, entries) = collector;
        let cli = Cli::parse_from([
            "log2fluent",
            "--stdout",
            &format!("tcp://{addr}"),
            "--tag",
            "svc",
            "sh",
            "-c",
            "echo one; echo two; exit 3",
        ]);

        let code = run(&cli).expect("child runs");

        assert_eq!(code, ExitCode::from(3));
        let logs: Vec<String> = (0..2)
            .map(|_| {
                let (tag, _, record) = entries
                    .recv_timeout(Duration::from_secs(5))
                    .expect("entry");
                assert_eq!(tag, "svc");
                record["log"].clone()
            })
            .collect();
        assert_eq!(logs, ["one", "two"]);
    }

    #[rstest]
    fn drain_returns_immediately_without_forwarders() {
        let started = Instant::now();
        drain(&[], Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[rstest]
    #[case(0, 0)]
    #[case(3 << 8, 3)]
    #[case(9, EXIT_SIGNALLED)]
    fn exit_code_mirrors_child(#[case] raw: i32, #[case] expected: u8) {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code(ExitStatus::from_raw(raw)), ExitCode::from(expected));
    }
}
