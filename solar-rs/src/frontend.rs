//! UI and game-loop collaborator.
//!
//! `ui …` and `game …` statements are evaluated by the interpreter and
//! forwarded here as [`FrontendCommand`]s.  A frontend answers with a value
//! (for `ui get … into`) and the callbacks its event loop produced, which the
//! interpreter then runs in order.
//!
//! [`HeadlessFrontend`] is the frontend used by the CLI and the tests: it
//! draws nothing, records every command, and replays scripted input events.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};

use thiserror::Error;
use tracing::debug;

use crate::script::error::ErrorKind;
use crate::script::stmt::{ClauseKind, Surface};
use crate::script::value::Value;

// ── Interface ─────────────────────────────────────────────────────────────────

/// A function to call with already evaluated arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    pub func: String,
    pub args: Vec<Value>,
}

/// An evaluated `ui`/`game` statement.  Name positionals arrive as strings.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontendCommand {
    pub surface: Surface,
    pub verb: String,
    pub args: Vec<Value>,
    pub clauses: Vec<(ClauseKind, Vec<Value>)>,
    pub callback: Option<Callback>,
}

impl FrontendCommand {
    pub fn new(surface: Surface, verb: impl Into<String>) -> Self {
        FrontendCommand {
            surface,
            verb: verb.into(),
            args: Vec::new(),
            clauses: Vec::new(),
            callback: None,
        }
    }

    pub fn clause(&self, kind: ClauseKind) -> Option<&[Value]> {
        self.clauses.iter().find(|(k, _)| *k == kind).map(|(_, v)| v.as_slice())
    }

    fn arg(&self, idx: usize) -> Result<&Value, FrontendError> {
        self.args
            .get(idx)
            .ok_or_else(|| self.fail(format!("missing argument {}", idx + 1)))
    }

    /// A name positional, rendered as text.
    fn name(&self, idx: usize) -> Result<String, FrontendError> {
        Ok(self.arg(idx)?.to_string())
    }

    fn number(&self, idx: usize) -> Result<f64, FrontendError> {
        let v = self.arg(idx)?;
        v.as_f64()
            .ok_or_else(|| self.fail(format!("expects a number, got {}", v.type_name())))
    }

    fn fail(&self, msg: impl std::fmt::Display) -> FrontendError {
        FrontendError::Failed(format!("{} {}: {msg}", self.surface.as_str(), self.verb))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontendReply {
    pub value: Value,
    /// Callbacks to run, in order, once the command returns.
    pub callbacks: Vec<Callback>,
}

impl FrontendReply {
    fn value(value: Value) -> Self {
        FrontendReply { value, callbacks: Vec::new() }
    }

    fn callbacks(callbacks: Vec<Callback>) -> Self {
        FrontendReply { value: Value::Nil, callbacks }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrontendError {
    #[error("unknown {what} `{name}`")]
    Unknown { what: &'static str, name: String },
    #[error("{0}")]
    Failed(String),
}

impl From<FrontendError> for ErrorKind {
    fn from(e: FrontendError) -> Self {
        match e {
            FrontendError::Unknown { name, .. } => ErrorKind::Name(name),
            FrontendError::Failed(msg) => ErrorKind::Frontend(msg),
        }
    }
}

pub trait Frontend {
    fn dispatch(&mut self, command: &FrontendCommand) -> Result<FrontendReply, FrontendError>;

    /// Lets embedders and tests get back at the concrete frontend.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ── Headless frontend ─────────────────────────────────────────────────────────

/// Simulated user input, consumed by `ui run` / `game run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEvent {
    /// Click a widget (buttons fire, checkboxes toggle).
    Click(String),
    /// Press a key bound with `ui bind` in a window.
    Press { window: String, key: String },
    /// Press a key bound with `game key`.
    GameKey(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub title: String,
    pub size: Option<(Value, Value)>,
    pub bg: Option<Value>,
    pub fg: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub window: String,
    pub kind: String,
    pub text: Value,
    pub value: Value,
    pub callback: Option<Callback>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameWindow {
    pub width: Value,
    pub height: Value,
    pub title: String,
}

#[derive(Debug, Default)]
pub struct HeadlessFrontend {
    events: Vec<FrontendCommand>,
    windows: BTreeMap<String, Window>,
    widgets: BTreeMap<String, Widget>,
    bindings: HashMap<(String, String), Callback>,
    keys: HashMap<String, Callback>,
    tick: Option<Callback>,
    game: Option<GameWindow>,
    frames: u64,
    script: VecDeque<ScriptedEvent>,
}

impl HeadlessFrontend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an input event for the next `run`.
    pub fn push_event(&mut self, event: ScriptedEvent) {
        self.script.push_back(event);
    }

    pub fn click(&mut self, widget: &str) {
        self.push_event(ScriptedEvent::Click(widget.to_owned()));
    }

    pub fn press(&mut self, window: &str, key: &str) {
        self.push_event(ScriptedEvent::Press { window: window.to_owned(), key: key.to_owned() });
    }

    /// Every command received so far, failed ones included.
    pub fn events(&self) -> &[FrontendCommand] {
        &self.events
    }

    pub fn window(&self, name: &str) -> Option<&Window> {
        self.windows.get(name)
    }

    pub fn widget(&self, name: &str) -> Option<&Widget> {
        self.widgets.get(name)
    }

    pub fn game_window(&self) -> Option<&GameWindow> {
        self.game.as_ref()
    }

    /// Total game frames simulated.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn window_mut(&mut self, name: &str) -> Result<&mut Window, FrontendError> {
        self.windows
            .get_mut(name)
            .ok_or_else(|| FrontendError::Unknown { what: "window", name: name.to_owned() })
    }

    fn widget_mut(&mut self, name: &str) -> Result<&mut Widget, FrontendError> {
        self.widgets
            .get_mut(name)
            .ok_or_else(|| FrontendError::Unknown { what: "widget", name: name.to_owned() })
    }

    fn add_widget(
        &mut self,
        cmd: &FrontendCommand,
        text: Value,
        value: Value,
    ) -> Result<FrontendReply, FrontendError> {
        let window = cmd.name(0)?;
        self.window_mut(&window)?;
        let name = cmd.name(1)?;
        let widget = Widget {
            window,
            kind: cmd.verb.clone(),
            text,
            value,
            callback: cmd.callback.clone(),
        };
        self.widgets.insert(name, widget);
        Ok(FrontendReply::default())
    }

    fn dispatch_ui(&mut self, cmd: &FrontendCommand) -> Result<FrontendReply, FrontendError> {
        match cmd.verb.as_str() {
            "window" => {
                let name = cmd.name(0)?;
                let title = match cmd.clause(ClauseKind::Title) {
                    Some([t, ..]) => t.to_string(),
                    _ => name.clone(),
                };
                let size = match cmd.clause(ClauseKind::Size) {
                    Some([w, h]) => Some((w.clone(), h.clone())),
                    _ => None,
                };
                self.windows.insert(name, Window { title, size, bg: None, fg: None });
                Ok(FrontendReply::default())
            }
            "title" => {
                let title = cmd.arg(1)?.to_string();
                self.window_mut(&cmd.name(0)?)?.title = title;
                Ok(FrontendReply::default())
            }
            "size" => {
                let size = (cmd.arg(1)?.clone(), cmd.arg(2)?.clone());
                self.window_mut(&cmd.name(0)?)?.size = Some(size);
                Ok(FrontendReply::default())
            }
            "bg" | "fg" => {
                let color = cmd.arg(1)?.clone();
                let window = self.window_mut(&cmd.name(0)?)?;
                if cmd.verb == "bg" {
                    window.bg = Some(color);
                } else {
                    window.fg = Some(color);
                }
                Ok(FrontendReply::default())
            }
            "label" | "button" => self.add_widget(cmd, cmd.arg(2)?.clone(), Value::Nil),
            "entry" => self.add_widget(cmd, Value::Nil, Value::Str(String::new())),
            "slider" => {
                let from = cmd
                    .clause(ClauseKind::From)
                    .and_then(|v| v.first())
                    .cloned()
                    .unwrap_or(Value::Int(0));
                self.add_widget(cmd, Value::Nil, from)
            }
            "checkbox" => self.add_widget(cmd, cmd.arg(2)?.clone(), Value::Int(0)),
            "bind" => {
                let window = cmd.name(0)?;
                self.window_mut(&window)?;
                let callback = cmd.callback.clone().ok_or_else(|| cmd.fail("missing `do`"))?;
                self.bindings.insert((window, cmd.name(1)?), callback);
                Ok(FrontendReply::default())
            }
            "text" => {
                let text = cmd.arg(1)?.clone();
                self.widget_mut(&cmd.name(0)?)?.text = text;
                Ok(FrontendReply::default())
            }
            "set" => {
                let value = cmd.arg(1)?.clone();
                self.widget_mut(&cmd.name(0)?)?.value = value;
                Ok(FrontendReply::default())
            }
            "get" => {
                let value = self.widget_mut(&cmd.name(0)?)?.value.clone();
                Ok(FrontendReply::value(value))
            }
            "run" => {
                let window = cmd.name(0)?;
                self.window_mut(&window)?;
                self.run_ui(&window)
            }
            other => Err(cmd.fail(format!("unsupported verb `{other}`"))),
        }
    }

    /// Replay queued clicks and key presses for `window`.
    fn run_ui(&mut self, window: &str) -> Result<FrontendReply, FrontendError> {
        let mut callbacks = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(event) = self.script.pop_front() {
            let handled = match &event {
                ScriptedEvent::Click(name) => {
                    let widget = self.widget_mut(name)?;
                    if widget.window == window {
                        if widget.kind == "checkbox" {
                            widget.value = Value::Int(i64::from(!widget.value.truthy()));
                        }
                        callbacks.extend(widget.callback.clone());
                        true
                    } else {
                        false
                    }
                }
                ScriptedEvent::Press { window: w, key } if w == window => {
                    match self.bindings.get(&(w.clone(), key.clone())) {
                        Some(cb) => callbacks.push(cb.clone()),
                        None => debug!(window = %w, key = %key, "unbound key ignored"),
                    }
                    true
                }
                _ => false,
            };
            if !handled {
                remaining.push_back(event);
            }
        }
        self.script = remaining;
        debug!(window, callbacks = callbacks.len(), "ui run finished");
        Ok(FrontendReply::callbacks(callbacks))
    }

    fn require_game(&self, cmd: &FrontendCommand) -> Result<(), FrontendError> {
        match self.game {
            Some(_) => Ok(()),
            None => Err(cmd.fail("no game window is open")),
        }
    }

    fn dispatch_game(&mut self, cmd: &FrontendCommand) -> Result<FrontendReply, FrontendError> {
        match cmd.verb.as_str() {
            "window" => {
                let (width, height) = (cmd.arg(0)?.clone(), cmd.arg(1)?.clone());
                for idx in 0..2 {
                    cmd.number(idx)?;
                }
                let title = match cmd.clause(ClauseKind::Title) {
                    Some([t, ..]) => t.to_string(),
                    _ => "Solar".to_owned(),
                };
                self.game = Some(GameWindow { width, height, title });
                Ok(FrontendReply::default())
            }
            "clear" | "sound" => {
                self.require_game(cmd)?;
                Ok(FrontendReply::default())
            }
            "rect" | "circle" | "line" => {
                self.require_game(cmd)?;
                for idx in 0..cmd.args.len() {
                    cmd.number(idx)?;
                }
                Ok(FrontendReply::default())
            }
            "text" => {
                self.require_game(cmd)?;
                if let Some(at) = cmd.clause(ClauseKind::At) {
                    if !at.iter().all(Value::is_number) {
                        return Err(cmd.fail("`at` expects numbers"));
                    }
                }
                Ok(FrontendReply::default())
            }
            "key" => {
                let callback = cmd.callback.clone().ok_or_else(|| cmd.fail("missing `do`"))?;
                self.keys.insert(cmd.name(0)?, callback);
                Ok(FrontendReply::default())
            }
            "tick" => {
                self.tick = cmd.callback.clone();
                Ok(FrontendReply::default())
            }
            "run" => {
                self.require_game(cmd)?;
                let frames = match cmd.clause(ClauseKind::Frames) {
                    Some([Value::Int(n)]) if *n >= 0 => *n as u64,
                    Some([other]) => {
                        return Err(cmd.fail(format!("`frames` expects a count, got {other}")))
                    }
                    _ => 1,
                };
                self.run_game(frames)
            }
            "quit" => {
                self.game = None;
                Ok(FrontendReply::default())
            }
            other => Err(cmd.fail(format!("unsupported verb `{other}`"))),
        }
    }

    /// Queued game key presses first, then one tick per frame.
    fn run_game(&mut self, frames: u64) -> Result<FrontendReply, FrontendError> {
        let mut callbacks = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(event) = self.script.pop_front() {
            match event {
                ScriptedEvent::GameKey(key) => callbacks.extend(self.keys.get(&key).cloned()),
                other => remaining.push_back(other),
            }
        }
        self.script = remaining;
        if let Some(tick) = &self.tick {
            for _ in 0..frames {
                callbacks.push(tick.clone());
            }
        }
        self.frames += frames;
        debug!(frames, callbacks = callbacks.len(), "game run finished");
        Ok(FrontendReply::callbacks(callbacks))
    }
}

impl Frontend for HeadlessFrontend {
    fn dispatch(&mut self, command: &FrontendCommand) -> Result<FrontendReply, FrontendError> {
        self.events.push(command.clone());
        match command.surface {
            Surface::Ui => self.dispatch_ui(command),
            Surface::Game => self.dispatch_game(command),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ui(verb: &str, args: &[&str]) -> FrontendCommand {
        let mut cmd = FrontendCommand::new(Surface::Ui, verb);
        cmd.args = args.iter().map(|a| Value::Str(a.to_string())).collect();
        cmd
    }

    fn at(mut cmd: FrontendCommand) -> FrontendCommand {
        cmd.clauses.push((ClauseKind::At, vec![Value::Int(0), Value::Int(0)]));
        cmd
    }

    fn with_callback(mut cmd: FrontendCommand, func: &str) -> FrontendCommand {
        cmd.callback = Some(Callback { func: func.into(), args: vec![] });
        cmd
    }

    #[test]
    fn records_every_command() {
        let mut fe = HeadlessFrontend::new();
        fe.dispatch(&ui("window", &["main"])).unwrap();
        assert!(fe.dispatch(&ui("title", &["nope", "x"])).is_err());
        assert_eq!(fe.events().len(), 2);
        assert_eq!(fe.window("main").unwrap().title, "main");
    }

    #[test]
    fn unknown_window_is_a_name_error() {
        let mut fe = HeadlessFrontend::new();
        let err = fe.dispatch(&at(ui("label", &["ghost", "l", "hi"]))).unwrap_err();
        assert_eq!(err, FrontendError::Unknown { what: "window", name: "ghost".into() });
        assert_eq!(ErrorKind::from(err), ErrorKind::Name("ghost".into()));
    }

    #[test]
    fn widget_defaults_and_set_get() {
        let mut fe = HeadlessFrontend::new();
        fe.dispatch(&ui("window", &["w"])).unwrap();
        fe.dispatch(&at(ui("entry", &["w", "name"]))).unwrap();
        fe.dispatch(&at(ui("checkbox", &["w", "ok", "Ok?"]))).unwrap();
        let mut slider = at(ui("slider", &["w", "vol"]));
        slider.clauses.push((ClauseKind::From, vec![Value::Int(3)]));
        slider.clauses.push((ClauseKind::To, vec![Value::Int(9)]));
        fe.dispatch(&slider).unwrap();

        assert_eq!(fe.dispatch(&ui("get", &["name"])).unwrap().value, Value::Str("".into()));
        assert_eq!(fe.dispatch(&ui("get", &["ok"])).unwrap().value, Value::Int(0));
        assert_eq!(fe.dispatch(&ui("get", &["vol"])).unwrap().value, Value::Int(3));

        fe.dispatch(&ui("set", &["name", "Ada"])).unwrap();
        assert_eq!(fe.dispatch(&ui("get", &["name"])).unwrap().value, Value::Str("Ada".into()));
    }

    #[test]
    fn ui_run_replays_clicks_and_presses() {
        let mut fe = HeadlessFrontend::new();
        fe.dispatch(&ui("window", &["w"])).unwrap();
        fe.dispatch(&with_callback(at(ui("button", &["w", "go", "Go"])), "on_go")).unwrap();
        fe.dispatch(&at(ui("checkbox", &["w", "ok", "Ok?"]))).unwrap();
        fe.dispatch(&with_callback(ui("bind", &["w", "q"]), "on_quit")).unwrap();

        fe.click("go");
        fe.click("ok");
        fe.press("w", "q");
        fe.press("w", "z");
        let reply = fe.dispatch(&ui("run", &["w"])).unwrap();
        let funcs: Vec<_> = reply.callbacks.iter().map(|c| c.func.as_str()).collect();
        assert_eq!(funcs, ["on_go", "on_quit"]);
        assert_eq!(fe.widget("ok").unwrap().value, Value::Int(1));
    }

    #[test]
    fn game_run_ticks_per_frame() {
        let mut fe = HeadlessFrontend::new();
        let mut run = FrontendCommand::new(Surface::Game, "run");
        assert!(matches!(fe.dispatch(&run), Err(FrontendError::Failed(_))));

        let mut window = FrontendCommand::new(Surface::Game, "window");
        window.args = vec![Value::Int(320), Value::Int(200)];
        fe.dispatch(&window).unwrap();
        fe.dispatch(&with_callback(FrontendCommand::new(Surface::Game, "tick"), "step")).unwrap();

        assert_eq!(fe.dispatch(&run).unwrap().callbacks.len(), 1);
        run.clauses.push((ClauseKind::Frames, vec![Value::Int(4)]));
        assert_eq!(fe.dispatch(&run).unwrap().callbacks.len(), 4);
        assert_eq!(fe.frames(), 5);
    }

    #[test]
    fn game_drawing_checks_numbers() {
        let mut fe = HeadlessFrontend::new();
        let mut window = FrontendCommand::new(Surface::Game, "window");
        window.args = vec![Value::Int(10), Value::Int(10)];
        fe.dispatch(&window).unwrap();
        let mut rect = FrontendCommand::new(Surface::Game, "rect");
        rect.args = vec![Value::Int(0), Value::Int(0), Value::Str("wide".into()), Value::Int(1)];
        assert!(matches!(fe.dispatch(&rect), Err(FrontendError::Failed(_))));
    }
}
