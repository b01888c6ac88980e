//! Scripted process runner for testing.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::process::{
    CommandSpec, ControlSignal, OutputLine, ProcessError, ProcessExit, ProcessHandle,
    ProcessRunner,
};

/// Side effect a scripted process performs, e.g. creating its output files.
pub type FileAction = Arc<dyn Fn(&CommandSpec) -> io::Result<()> + Send + Sync>;

/// Side effect performed once per step of a gradual script.
pub type StepAction = Arc<dyn Fn(&CommandSpec, usize) -> io::Result<()> + Send + Sync>;

type Matcher = Arc<dyn Fn(&CommandSpec) -> bool + Send + Sync>;

#[derive(Clone)]
struct Steps {
    count: usize,
    interval: Duration,
    action: StepAction,
}

/// Behaviour of one scripted process.
///
/// A script prints its lines right away, then performs its steps (one every
/// `interval`), waits `delay`, runs its file action and exits with its code.
/// A hanging script does the same work but then keeps running until it is
/// terminated or killed. A failing action makes the process exit with 1.
#[derive(Clone)]
pub struct Script {
    exit_code: i32,
    stdout: Vec<String>,
    stderr: Vec<String>,
    delay: Duration,
    steps: Option<Steps>,
    action: Option<FileAction>,
    hang: bool,
    ignore_terminate: bool,
    launch_failure: bool,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("exit_code", &self.exit_code)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("delay", &self.delay)
            .field("steps", &self.steps.as_ref().map(|s| s.count))
            .field("has_action", &self.action.is_some())
            .field("hang", &self.hang)
            .field("ignore_terminate", &self.ignore_terminate)
            .field("launch_failure", &self.launch_failure)
            .finish()
    }
}

impl Script {
    /// A process that exits with `code`.
    pub fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            stdout: Vec::new(),
            stderr: Vec::new(),
            delay: Duration::ZERO,
            steps: None,
            action: None,
            hang: false,
            ignore_terminate: false,
            launch_failure: false,
        }
    }

    pub fn success() -> Self {
        Self::exit(0)
    }

    /// A process that runs until terminated or killed.
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::exit(0)
        }
    }

    /// `start` fails as if the executable were missing.
    pub fn launch_failure() -> Self {
        Self {
            launch_failure: true,
            ..Self::exit(0)
        }
    }

    pub fn stdout_line(mut self, line: impl Into<String>) -> Self {
        self.stdout.push(line.into());
        self
    }

    pub fn stderr_line(mut self, line: impl Into<String>) -> Self {
        self.stderr.push(line.into());
        self
    }

    /// Waits before exiting.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Runs `action` before exiting.
    pub fn with_files<F>(mut self, action: F) -> Self
    where
        F: Fn(&CommandSpec) -> io::Result<()> + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Runs `action(spec, i)` for `i in 0..count`, one every `interval`.
    pub fn with_steps<F>(mut self, count: usize, interval: Duration, action: F) -> Self
    where
        F: Fn(&CommandSpec, usize) -> io::Result<()> + Send + Sync + 'static,
    {
        self.steps = Some(Steps {
            count,
            interval,
            action: Arc::new(action),
        });
        self
    }

    /// A terminate request is recorded but ignored; only kill stops it.
    pub fn ignoring_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }
}

/// A command launched through a [`ScriptedRunner`].
#[derive(Debug, Clone)]
pub struct RecordedCommand {
    pub spec: CommandSpec,
    /// Control requests received while it ran, in order.
    pub signals: Vec<ControlSignal>,
    /// Set once the scripted process has exited.
    pub exit: Option<ProcessExit>,
}

impl RecordedCommand {
    pub fn was_terminated(&self) -> bool {
        self.signals.contains(&ControlSignal::Terminate)
    }

    pub fn was_killed(&self) -> bool {
        self.signals.contains(&ControlSignal::Kill)
    }
}

struct Rule {
    matcher: Matcher,
    script: Script,
    remaining: Option<usize>,
}

/// In-process [`ProcessRunner`] whose processes follow [`Script`]s.
///
/// Scripts are chosen by matching rules; the most recently added matching
/// rule wins and unmatched commands succeed silently. Every launched command
/// is recorded along with the control signals it received.
///
/// # Example
///
/// ```rust,ignore
/// let runner = ScriptedRunner::new();
/// runner.on_program("ffprobe", Script::exit(0).stdout_line("30000/1001")).await;
/// runner.on(|spec| spec.has_arg("-vf"), Script::exit(1)).await;
///
/// // ... run a pipeline with Arc::new(runner.clone()) ...
///
/// assert_eq!(runner.commands_for("ffprobe").await.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    rules: Arc<RwLock<Vec<Rule>>>,
    commands: Arc<RwLock<Vec<RecordedCommand>>>,
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner").finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `script` for every command whose program is named `program`.
    pub async fn on_program(&self, program: &str, script: Script) {
        let program = program.to_string();
        self.on(move |spec| program_matches(spec, &program), script)
            .await;
    }

    /// Uses `script` for every command accepted by `matcher`.
    pub async fn on<F>(&self, matcher: F, script: Script)
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.add_rule(Arc::new(matcher), script, None).await;
    }

    /// Uses `script` for the next command accepted by `matcher` only.
    pub async fn once<F>(&self, matcher: F, script: Script)
    where
        F: Fn(&CommandSpec) -> bool + Send + Sync + 'static,
    {
        self.add_rule(Arc::new(matcher), script, Some(1)).await;
    }

    /// Every launched command, in launch order.
    pub async fn commands(&self) -> Vec<RecordedCommand> {
        self.commands.read().await.clone()
    }

    /// Launched commands whose program is named `program`.
    pub async fn commands_for(&self, program: &str) -> Vec<RecordedCommand> {
        self.commands
            .read()
            .await
            .iter()
            .filter(|c| program_matches(&c.spec, program))
            .cloned()
            .collect()
    }

    /// Number of scripted processes that have not exited yet.
    pub async fn running_count(&self) -> usize {
        self.commands
            .read()
            .await
            .iter()
            .filter(|c| c.exit.is_none())
            .count()
    }

    async fn add_rule(&self, matcher: Matcher, script: Script, remaining: Option<usize>) {
        self.rules.write().await.push(Rule {
            matcher,
            script,
            remaining,
        });
    }

    async fn script_for(&self, spec: &CommandSpec) -> Script {
        let mut rules = self.rules.write().await;
        for rule in rules.iter_mut().rev() {
            if rule.remaining == Some(0) || !(rule.matcher)(spec) {
                continue;
            }
            if let Some(remaining) = rule.remaining.as_mut() {
                *remaining -= 1;
            }
            return rule.script.clone();
        }
        Script::success()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self, spec: &CommandSpec) -> Result<ProcessHandle, ProcessError> {
        let script = self.script_for(spec).await;
        if script.launch_failure {
            return Err(ProcessError::launch(
                &spec.program,
                io::Error::new(io::ErrorKind::NotFound, "scripted launch failure"),
            ));
        }

        let index = {
            let mut commands = self.commands.write().await;
            commands.push(RecordedCommand {
                spec: spec.clone(),
                signals: Vec::new(),
                exit: None,
            });
            commands.len() - 1
        };

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        tokio::spawn(play(
            script,
            spec.clone(),
            Recorder {
                commands: Arc::clone(&self.commands),
                index,
            },
            line_tx,
            control_rx,
            exit_tx,
        ));

        Ok(ProcessHandle::from_parts(
            spec.program.clone(),
            None,
            line_rx,
            exit_rx,
            control_tx,
        ))
    }
}

struct Recorder {
    commands: Arc<RwLock<Vec<RecordedCommand>>>,
    index: usize,
}

impl Recorder {
    async fn signal(&self, signal: ControlSignal) {
        if let Some(command) = self.commands.write().await.get_mut(self.index) {
            command.signals.push(signal);
        }
    }

    async fn exit(&self, exit: ProcessExit) {
        if let Some(command) = self.commands.write().await.get_mut(self.index) {
            command.exit = Some(exit);
        }
    }
}

async fn play(
    script: Script,
    spec: CommandSpec,
    recorder: Recorder,
    line_tx: mpsc::UnboundedSender<OutputLine>,
    mut control_rx: mpsc::UnboundedReceiver<ControlSignal>,
    exit_tx: oneshot::Sender<ProcessExit>,
) {
    for line in &script.stdout {
        let _ = line_tx.send(OutputLine::stdout(line.clone()));
    }
    for line in &script.stderr {
        let _ = line_tx.send(OutputLine::stderr(line.clone()));
    }

    let work = async {
        match perform(&script, &spec).await {
            Ok(()) if script.hang => std::future::pending::<ProcessExit>().await,
            Ok(()) => ProcessExit::exited(script.exit_code),
            Err(e) => {
                let _ = line_tx.send(OutputLine::stderr(e.to_string()));
                ProcessExit::exited(1)
            }
        }
    };

    let exit = tokio::select! {
        exit = work => exit,
        exit = wait_for_stop(&mut control_rx, script.ignore_terminate, &recorder) => exit,
    };

    recorder.exit(exit).await;
    drop(line_tx);
    let _ = exit_tx.send(exit);
}

async fn perform(script: &Script, spec: &CommandSpec) -> io::Result<()> {
    if let Some(steps) = &script.steps {
        for i in 0..steps.count {
            tokio::time::sleep(steps.interval).await;
            (steps.action)(spec, i)?;
        }
    }
    if !script.delay.is_zero() {
        tokio::time::sleep(script.delay).await;
    }
    if let Some(action) = &script.action {
        action(spec)?;
    }
    Ok(())
}

async fn wait_for_stop(
    control_rx: &mut mpsc::UnboundedReceiver<ControlSignal>,
    ignore_terminate: bool,
    recorder: &Recorder,
) -> ProcessExit {
    while let Some(signal) = control_rx.recv().await {
        recorder.signal(signal).await;
        if signal == ControlSignal::Terminate && ignore_terminate {
            continue;
        }
        return ProcessExit::killed();
    }
    // Handle dropped.
    ProcessExit::killed()
}

fn program_matches(spec: &CommandSpec, program: &str) -> bool {
    spec.program_name() == program
        || Path::new(&spec.program)
            .file_stem()
            .map(|stem| stem == program)
            .unwrap_or(false)
}
