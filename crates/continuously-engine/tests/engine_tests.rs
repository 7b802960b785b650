use continuously_core::{Registrar, RunConfig, WatchError, WatchSet};
use continuously_engine::{
    ActionRunner, Cause, Console, EventLoop, ExitOutcome, Inotify, Signal, SignalFd, SignalSet,
    TerminalController, TriggerKind, TriggerOutcome, shutdown,
};
use std::cell::RefCell;
use std::ffi::OsString;
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

#[derive(Clone, Default)]
struct Buffer(Rc<RefCell<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Buffer {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

fn config(command: &[&str]) -> RunConfig {
    RunConfig::builder()
        .command(command.iter().map(OsString::from).collect::<Vec<_>>())
        .build()
        .unwrap()
}

fn runner(command: &[&str], input_fd: Option<RawFd>) -> ActionRunner {
    ActionRunner::new(config(command), input_fd, SignalSet::watched().unwrap())
}

/// Block until `pid` has exited, leaving it to be reaped by the runner.
fn wait_exited(pid: u32) {
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    let r = unsafe {
        libc::waitid(
            libc::P_PID,
            pid as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOWAIT,
        )
    };
    assert_eq!(r, 0, "waitid: {}", std::io::Error::last_os_error());
}

fn kill_and_reap(runner: &mut ActionRunner) {
    if let Some(pid) = runner.signal(Signal(libc::SIGKILL)).unwrap() {
        wait_exited(pid);
        assert!(runner.try_reap().unwrap().is_some());
    }
}

fn spawned_pid(outcome: TriggerOutcome) -> u32 {
    match outcome {
        TriggerOutcome::Spawned { pid } => pid,
        other => panic!("expected a spawn, got {other:?}"),
    }
}

struct Pty {
    master: OwnedFd,
    slave: OwnedFd,
}

fn open_pty() -> Pty {
    unsafe {
        let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC);
        assert!(master >= 0, "posix_openpt: {}", std::io::Error::last_os_error());
        let master = OwnedFd::from_raw_fd(master);
        assert_eq!(libc::grantpt(master.as_raw_fd()), 0);
        assert_eq!(libc::unlockpt(master.as_raw_fd()), 0);

        let mut name = [0 as libc::c_char; 128];
        assert_eq!(libc::ptsname_r(master.as_raw_fd(), name.as_mut_ptr(), name.len()), 0);
        let slave = libc::open(name.as_ptr(), libc::O_RDWR | libc::O_NOCTTY | libc::O_CLOEXEC);
        assert!(slave >= 0, "open slave: {}", std::io::Error::last_os_error());

        Pty {
            master,
            slave: OwnedFd::from_raw_fd(slave),
        }
    }
}

fn type_keys(pty: &Pty, keys: &[u8]) {
    let n = unsafe { libc::write(pty.master.as_raw_fd(), keys.as_ptr().cast(), keys.len()) };
    assert_eq!(n, keys.len() as isize);
}

fn lflag(fd: RawFd) -> libc::tcflag_t {
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    assert_eq!(unsafe { libc::tcgetattr(fd, &mut termios) }, 0);
    termios.c_lflag
}

fn status_flags(fd: RawFd) -> libc::c_int {
    unsafe { libc::fcntl(fd, libc::F_GETFL) }
}

fn idle_signals() -> SignalFd {
    SignalFd::new(&SignalSet::watched().unwrap()).unwrap()
}

// ==================== ActionRunner ====================

#[test]
fn test_nonzero_exit_banner() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut runner = runner(&["sh", "-c", "exit 3"], None);

    let pid = spawned_pid(runner.trigger(TriggerKind::File, &mut console).unwrap());
    assert_eq!(runner.running_pid(), Some(pid));

    wait_exited(pid);
    assert_eq!(runner.reap(&mut console).unwrap(), ExitOutcome::Exited(3));
    assert!(!runner.is_running());
    assert_eq!(out.text(), "[file trigger]\n[3] [wait] ");
}

#[test]
fn test_action_sees_marker_environment() {
    let temp = tempfile::TempDir::new().unwrap();
    let marker = temp.path().join("marker");
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut runner = runner(
        &[
            "sh",
            "-c",
            "printf %s \"$CONTINUOUSLY\" > \"$1\"",
            "sh",
            marker.to_str().unwrap(),
        ],
        None,
    );

    let pid = spawned_pid(runner.trigger(TriggerKind::Manual, &mut console).unwrap());
    wait_exited(pid);

    assert_eq!(runner.reap(&mut console).unwrap(), ExitOutcome::Exited(0));
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "1");
    assert_eq!(out.text(), "[manual trigger]\n[wait] ");
}

#[test]
fn test_trigger_while_running_is_dropped() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut runner = runner(&["sleep", "30"], None);

    let pid = spawned_pid(runner.trigger(TriggerKind::File, &mut console).unwrap());
    assert_eq!(
        runner.trigger(TriggerKind::Manual, &mut console).unwrap(),
        TriggerOutcome::AlreadyRunning { pid }
    );
    assert_eq!(runner.running_pid(), Some(pid));
    assert_eq!(out.text(), "[file trigger]\n");

    assert_eq!(runner.signal(Signal(libc::SIGKILL)).unwrap(), Some(pid));
    wait_exited(pid);
    assert_eq!(
        runner.reap(&mut console).unwrap(),
        ExitOutcome::Signaled(Signal(libc::SIGKILL))
    );
    assert_eq!(out.text(), "[file trigger]\n[Killed] [wait] ");
}

#[test]
fn test_reap_of_live_action_is_fatal() {
    let mut console = Console::new(Buffer::default(), true);
    let mut runner = runner(&["sleep", "30"], None);

    let pid = spawned_pid(runner.trigger(TriggerKind::File, &mut console).unwrap());
    assert!(matches!(
        runner.reap(&mut console),
        Err(WatchError::PidMismatch { expected, reaped: None }) if expected == pid
    ));

    kill_and_reap(&mut runner);
    assert!(!runner.is_running());
}

#[test]
fn test_reap_without_action_is_fatal() {
    let mut console = Console::new(Buffer::default(), true);
    let mut runner = runner(&["true"], None);

    assert!(matches!(
        runner.reap(&mut console),
        Err(WatchError::NoRunningAction)
    ));
}

#[test]
fn test_runner_survives_failed_exec() {
    let temp = tempfile::TempDir::new().unwrap();
    let script = temp.path().join("build.sh");
    let log = temp.path().join("log");
    std::fs::write(&script, format!("#!/bin/sh\necho built >> '{}'\n", log.display())).unwrap();

    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut runner = runner(&[script.to_str().unwrap()], None);

    // not executable yet
    assert_eq!(
        runner.trigger(TriggerKind::File, &mut console).unwrap(),
        TriggerOutcome::Failed {
            errno: libc::EACCES
        }
    );
    assert!(!runner.is_running());
    assert_eq!(out.text(), "[file trigger]\n[Permission denied] [wait] ");

    // the child-status notice of the failed child is tolerated once
    assert_eq!(runner.child_status(&mut console).unwrap(), None);
    assert!(matches!(
        runner.child_status(&mut console),
        Err(WatchError::NoRunningAction)
    ));

    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&script, perms).unwrap();

    let pid = spawned_pid(runner.trigger(TriggerKind::Manual, &mut console).unwrap());
    wait_exited(pid);
    assert_eq!(
        runner.child_status(&mut console).unwrap(),
        Some(ExitOutcome::Exited(0))
    );
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "built\n");
    assert_eq!(
        out.text(),
        "[file trigger]\n[Permission denied] [wait] [manual trigger]\n[wait] "
    );
}

#[test]
fn test_missing_program_is_reported() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut runner = runner(&["/nonexistent/continuously-test-program"], None);

    assert_eq!(
        runner.trigger(TriggerKind::File, &mut console).unwrap(),
        TriggerOutcome::Failed {
            errno: libc::ENOENT
        }
    );
    assert!(!runner.is_running());
    assert_eq!(runner.signal(Signal::TERMINATE).unwrap(), None);
    assert_eq!(out.text(), "[file trigger]\n[No such file or directory] [wait] ");
}

#[test]
fn test_failed_exec_keeps_running_quietly() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), true);
    let mut runner = runner(&["/nonexistent/continuously-test-program"], None);

    for _ in 0..2 {
        assert!(matches!(
            runner.trigger(TriggerKind::File, &mut console).unwrap(),
            TriggerOutcome::Failed { .. }
        ));
    }
    assert_eq!(runner.child_status(&mut console).unwrap(), None);
    assert!(out.text().is_empty());
}

#[test]
fn test_quiet_runner_prints_nothing() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), true);
    let mut runner = runner(&["sh", "-c", "exit 1"], None);

    let pid = spawned_pid(runner.trigger(TriggerKind::File, &mut console).unwrap());
    wait_exited(pid);

    assert_eq!(runner.reap(&mut console).unwrap(), ExitOutcome::Exited(1));
    assert!(out.text().is_empty());
}

// ==================== Shutdown ====================

#[test]
fn test_shutdown_forwards_to_running_action() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut terminal = TerminalController::disabled(false);
    let mut runner = runner(&["sleep", "30"], None);

    let pid = spawned_pid(runner.trigger(TriggerKind::Manual, &mut console).unwrap());
    let done = shutdown(
        Cause::Signal(Signal::TERMINATE),
        &mut runner,
        &mut terminal,
        &mut console,
    )
    .unwrap();

    assert_eq!(done.cause, Cause::Signal(Signal::TERMINATE));
    assert_eq!(done.forwarded, Some(pid));
    assert_eq!(out.text(), "[manual trigger]\n[quit]\n");

    kill_and_reap(&mut runner);
}

#[test]
fn test_shutdown_when_idle() {
    let out = Buffer::default();
    let mut console = Console::new(out.clone(), false);
    let mut terminal = TerminalController::disabled(false);
    let mut runner = runner(&["true"], None);

    let done = shutdown(Cause::Key(b'x'), &mut runner, &mut terminal, &mut console).unwrap();

    assert_eq!(done.forwarded, None);
    assert_eq!(done.cause.child_signal(), Signal::INTERRUPT);
    assert_eq!(out.text(), "[quit]\n");
}

// ==================== TerminalController ====================

#[test]
fn test_terminal_raw_mode_and_restore() {
    let pty = open_pty();
    let fd = pty.slave.as_raw_fd();
    let before = lflag(fd);
    assert_ne!(before & libc::ICANON, 0);

    let mut terminal = TerminalController::setup(fd, false).unwrap();
    assert!(terminal.is_interactive());
    assert_eq!(terminal.input_fd(), Some(fd));
    assert_eq!(lflag(fd) & (libc::ECHO | libc::ICANON), 0);
    assert_ne!(lflag(fd) & libc::ISIG, 0);
    assert_ne!(status_flags(fd) & libc::O_NONBLOCK, 0);

    terminal.restore().unwrap();
    assert_eq!(lflag(fd), before);
    assert_eq!(status_flags(fd) & libc::O_NONBLOCK, 0);

    // a second restore is a no-op
    terminal.restore().unwrap();
}

#[test]
fn test_terminal_restored_on_drop() {
    let pty = open_pty();
    let fd = pty.slave.as_raw_fd();
    let before = lflag(fd);

    {
        let _terminal = TerminalController::setup(fd, true).unwrap();
        assert_ne!(lflag(fd), before);
    }

    assert_eq!(lflag(fd), before);
}

// ==================== EventLoop ====================

#[test]
fn test_file_change_triggers_action() {
    let watched = tempfile::TempDir::new().unwrap();
    let scratch = tempfile::TempDir::new().unwrap();
    let path = watched.path().join("watched.txt");
    let log = scratch.path().join("log");
    std::fs::write(&path, "before").unwrap();

    let mut inotify = Inotify::new().unwrap();
    let mut watches = WatchSet::new();
    assert!(watches.add(&mut inotify, &path).unwrap());

    let out = Buffer::default();
    let mut event_loop = EventLoop::new(
        inotify,
        idle_signals(),
        watches,
        runner(
            &["sh", "-c", "echo ran >> \"$1\"", "sh", log.to_str().unwrap()],
            None,
        ),
        TerminalController::disabled(false),
        Console::new(out.clone(), false),
    );

    std::fs::write(&path, "after").unwrap();
    assert_eq!(
        event_loop.poll_once(Some(Duration::from_secs(5))).unwrap(),
        None
    );

    let pid = event_loop.runner().running_pid().expect("action started");
    assert!(out.text().starts_with("[file trigger]\n"));
    assert_eq!(event_loop.watches().active_count(), 1);

    wait_exited(pid);
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "ran\n");
    assert_eq!(
        event_loop.runner_mut().try_reap().unwrap(),
        Some(ExitOutcome::Exited(0))
    );
}

#[test]
fn test_file_change_with_missing_program_keeps_watching() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("watched.txt");
    std::fs::write(&path, "before").unwrap();

    let mut inotify = Inotify::new().unwrap();
    let mut watches = WatchSet::new();
    assert!(watches.add(&mut inotify, &path).unwrap());

    let out = Buffer::default();
    let mut event_loop = EventLoop::new(
        inotify,
        idle_signals(),
        watches,
        runner(&["./not-yet-built.sh"], None),
        TerminalController::disabled(false),
        Console::new(out.clone(), false),
    );

    std::fs::write(&path, "after").unwrap();
    assert_eq!(
        event_loop.poll_once(Some(Duration::from_secs(5))).unwrap(),
        None
    );
    assert!(!event_loop.runner().is_running());
    assert_eq!(event_loop.watches().active_count(), 1);
    assert_eq!(out.text(), "[file trigger]\n[No such file or directory] [wait] ");
}

#[test]
fn test_unknown_handle_is_fatal() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("stray.txt");
    std::fs::write(&path, "a").unwrap();

    // registered behind the watch set's back
    let mut inotify = Inotify::new().unwrap();
    inotify.register(&path).unwrap().unwrap();

    let mut event_loop = EventLoop::new(
        inotify,
        idle_signals(),
        WatchSet::new(),
        runner(&["true"], None),
        TerminalController::disabled(false),
        Console::new(Buffer::default(), true),
    );

    std::fs::write(&path, "b").unwrap();
    assert!(matches!(
        event_loop.poll_once(Some(Duration::from_secs(5))),
        Err(WatchError::UnknownHandle { .. })
    ));
    assert!(!event_loop.runner().is_running());
}

#[test]
fn test_keystrokes_trigger_and_cancel() {
    let pty = open_pty();
    let fd = pty.slave.as_raw_fd();
    let before = lflag(fd);

    let terminal = TerminalController::setup(fd, false).unwrap();
    let out = Buffer::default();
    let mut event_loop = EventLoop::new(
        Inotify::new().unwrap(),
        idle_signals(),
        WatchSet::new(),
        runner(&["sleep", "30"], terminal.input_fd()),
        terminal,
        Console::new(out.clone(), false),
    );

    type_keys(&pty, b"\n");
    assert_eq!(
        event_loop.poll_once(Some(Duration::from_secs(5))).unwrap(),
        None
    );
    let pid = event_loop.runner().running_pid().expect("manual trigger");
    assert_eq!(out.text(), "[manual trigger]\n");

    type_keys(&pty, b"q");
    let done = event_loop
        .poll_once(Some(Duration::from_secs(5)))
        .unwrap()
        .expect("cancel key");

    assert_eq!(done.cause, Cause::Key(b'q'));
    assert_eq!(done.forwarded, Some(pid));
    assert_eq!(out.text(), "[manual trigger]\n[quit]\n");
    assert_eq!(lflag(fd), before);

    kill_and_reap(event_loop.runner_mut());
}

#[test]
fn test_other_keys_are_ignored() {
    let pty = open_pty();
    let terminal = TerminalController::setup(pty.slave.as_raw_fd(), false).unwrap();
    let mut event_loop = EventLoop::new(
        Inotify::new().unwrap(),
        idle_signals(),
        WatchSet::new(),
        runner(&["true"], terminal.input_fd()),
        terminal,
        Console::new(Buffer::default(), true),
    );

    type_keys(&pty, b"abc");
    assert_eq!(
        event_loop.poll_once(Some(Duration::from_secs(5))).unwrap(),
        None
    );
    assert!(!event_loop.runner().is_running());
}

#[test]
fn test_non_interactive_input_is_not_read() {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) }, 0);
    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    let terminal = TerminalController::setup(rx.as_raw_fd(), false).unwrap();
    assert!(!terminal.is_interactive());

    let mut event_loop = EventLoop::new(
        Inotify::new().unwrap(),
        idle_signals(),
        WatchSet::new(),
        runner(&["true"], terminal.input_fd()),
        terminal,
        Console::new(Buffer::default(), true),
    );

    let n = unsafe { libc::write(tx.as_raw_fd(), b"\nq".as_ptr().cast(), 2) };
    assert_eq!(n, 2);
    assert_eq!(
        event_loop
            .poll_once(Some(Duration::from_millis(200)))
            .unwrap(),
        None
    );
    assert!(!event_loop.runner().is_running());
}
