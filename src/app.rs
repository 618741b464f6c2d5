use crate::api::types::{Rol, Usuario};
use crate::api::ApiClient;
use crate::attendance::AttendanceCache;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::event::{Event, EventHandler};
use crate::notifications::{Backoff, NotificationListener};
use crate::query::Pending;
use crate::session::{Navigation, SessionManager};
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::{draw_footer, draw_header, extract_domain};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{
  AlmacenListView, DashboardView, LoginView, TrabajadorListView, UsuarioListView,
};
use crate::ui::StatusLine;
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Services shared by every view
#[derive(Clone)]
pub struct AppContext {
  pub client: ApiClient,
  pub manager: SessionManager,
  pub attendance: AttendanceCache,
  pub status: StatusLine,
}

impl AppContext {
  /// Show the outcome of a write in the status line.
  ///
  /// Returns `true` when the write succeeded and the view should reload.
  pub fn report(&self, result: ApiResult<String>) -> bool {
    match result {
      Ok(message) => {
        self.status.info(message);
        true
      }
      Err(ApiError::Aborted) => false,
      Err(e) => {
        warn!(error = %e, "write failed");
        self.status.error(e.to_string());
        false
      }
    }
  }

  /// Failed reads leave the view in its empty state; the status line says why.
  pub fn report_load_error(&self, what: &str, error: &ApiError) {
    match error {
      // The session layer is already sending the user to the login screen
      ApiError::Aborted | ApiError::Unauthorized => {}
      e => self.status.error(format!("No se pudieron cargar {}: {}", what, e)),
    }
  }
}

#[cfg(test)]
impl AppContext {
  /// Signed-out services pointed at a port nothing listens on
  pub(crate) fn for_tests() -> Self {
    use crate::cache::MemoryStorage;
    use crate::rate_limit::RateLimiter;
    use crate::session::{AuthSignals, SessionCache, SessionSettings, TokenStore};
    use std::sync::Arc;

    let mut config = Config::default();
    config.api.url = "http://127.0.0.1:9".to_string();
    let tokens = TokenStore::in_memory();
    let client = ApiClient::new(
      &config,
      tokens.clone(),
      Arc::new(RateLimiter::default()),
      AuthSignals::new(),
    )
    .unwrap();
    let session = SessionCache::new(Arc::new(client.clone()), tokens, SessionSettings::default());
    Self {
      manager: SessionManager::new(client.clone(), session),
      client,
      attendance: AttendanceCache::new(MemoryStorage::new()),
      status: StatusLine::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
  Login,
  Main,
}

/// Main application state
pub struct App {
  ctx: AppContext,

  config: Config,

  /// Header title (configured, or the backend host)
  title: String,

  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,

  /// `:` command palette
  command_input: CommandInput,

  screen: Screen,

  /// Validated user for the header
  user_rx: watch::Receiver<Option<Usuario>>,

  /// Live attendance notifications while signed in
  listener: Option<NotificationListener>,

  /// Auth signal loop
  signal_task: Option<JoinHandle<()>>,

  /// Server logout in flight; the screen stays on login until it settles
  logout: Option<Pending<()>>,

  /// Event sender for background tasks
  event_tx: Option<mpsc::UnboundedSender<Event>>,

  should_quit: bool,
}

impl App {
  pub fn new(config: Config, ctx: AppContext) -> Self {
    let title = config
      .title
      .clone()
      .unwrap_or_else(|| extract_domain(&config.api.url).to_string());
    let user_rx = ctx.manager.session().subscribe();

    let (screen, root): (Screen, Box<dyn View>) = if ctx.manager.session().is_authenticated() {
      (Screen::Main, Box::new(AlmacenListView::new(ctx.clone())))
    } else {
      (Screen::Login, Box::new(LoginView::new(ctx.clone())))
    };

    Self {
      ctx,
      config,
      title,
      view_stack: vec![root],
      command_input: CommandInput::new(),
      screen,
      user_rx,
      listener: None,
      signal_task: None,
      logout: None,
      event_tx: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(Duration::from_millis(250));
    self.start_background(events.sender());

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    if let Some(task) = self.signal_task.take() {
      task.abort();
    }
    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  fn start_background(&mut self, tx: mpsc::UnboundedSender<Event>) {
    let nav_tx = tx.clone();
    self.signal_task = Some(self.ctx.manager.spawn(move |navigation| {
      let _ = nav_tx.send(Event::Navigate(navigation));
    }));
    self.event_tx = Some(tx);

    if self.screen == Screen::Main {
      self.start_listener();

      // Refresh the header user; an expired token ends up on the login screen
      let session = self.ctx.manager.session().clone();
      tokio::spawn(async move {
        if let Err(e) = session.current_user().await {
          warn!(error = %e, "could not validate stored session");
        }
      });
    }
  }

  fn start_listener(&mut self) {
    if !self.config.notifications.enabled {
      return;
    }
    let Some(tx) = self.event_tx.clone() else {
      return;
    };
    let backoff = Backoff::from_config(&self.config.notifications);
    self.listener = Some(NotificationListener::spawn(
      self.ctx.client.clone(),
      backoff,
      move |notification| {
        let _ = tx.send(Event::Notification(notification));
      },
    ));
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::Notification(notification) => {
        debug!(?notification, "notification");
        for view in &mut self.view_stack {
          view.on_notification(&notification);
        }
      }
      Event::Navigate(Navigation::Login) => {
        if self.screen == Screen::Main {
          self.ctx.status.error("La sesión expiró, vuelve a iniciar sesión");
          self.enter_login();
        }
      }
    }
  }

  fn tick(&mut self) {
    for view in &mut self.view_stack {
      view.tick();
    }

    if let Some(pending) = &mut self.logout {
      if pending.try_take().is_some() {
        self.logout = None;
      }
    }
    self.sync_screen();
  }

  /// Follow the token: signing in leaves the login screen, losing it returns there.
  fn sync_screen(&mut self) {
    if self.logout.is_some() {
      return;
    }
    let authenticated = self.ctx.manager.session().is_authenticated();
    match (self.screen, authenticated) {
      (Screen::Login, true) => self.enter_main(),
      (Screen::Main, false) => self.enter_login(),
      _ => {}
    }
  }

  fn enter_main(&mut self) {
    info!("entering main screen");
    self.screen = Screen::Main;
    self.view_stack = vec![Box::new(AlmacenListView::new(self.ctx.clone()))];
    self.start_listener();
  }

  fn enter_login(&mut self) {
    info!("entering login screen");
    self.screen = Screen::Login;
    self.listener = None;
    self.ctx.attendance.clear();
    self.view_stack = vec![Box::new(LoginView::new(self.ctx.clone()))];
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    if self.command_input.is_active() {
      if let KeyResult::Event(CommandEvent::Submitted(cmd)) = self.command_input.handle_key(key) {
        self.execute_command(&cmd);
      }
      return;
    }

    let capturing = self
      .view_stack
      .last()
      .map(|v| v.is_capturing_input())
      .unwrap_or(false);
    if !capturing && self.screen == Screen::Main && key.code == KeyCode::Char(':') {
      self.command_input.activate();
      return;
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack = vec![view];
  }

  fn execute_command(&mut self, cmd: &str) {
    debug!(cmd, "command");
    let ctx = self.ctx.clone();
    match cmd {
      "almacenes" => self.set_root(Box::new(AlmacenListView::new(ctx))),
      "trabajadores" => self.set_root(Box::new(TrabajadorListView::new(ctx))),
      "coordinadores" => self.set_root(Box::new(UsuarioListView::new(ctx, Rol::Coordinador))),
      "rrhh" => self.set_root(Box::new(UsuarioListView::new(ctx, Rol::Rrhh))),
      "dashboard" => self.set_root(Box::new(DashboardView::new(ctx))),
      "logout" => {
        let manager = self.ctx.manager.clone();
        self.logout = Some(Pending::spawn(async move { manager.logout().await }));
        self.ctx.status.info("Sesión cerrada");
        self.enter_login();
      }
      "quit" => self.should_quit = true,
      "" => {}
      other => self.ctx.status.error(format!("Comando desconocido: {}", other)),
    }
  }

  fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  fn draw(&mut self, frame: &mut Frame) {
    let [header, content, footer] = Layout::vertical([
      Constraint::Length(1),
      Constraint::Min(1),
      Constraint::Length(1),
    ])
    .areas(frame.area());

    let user = self.user_rx.borrow().clone();
    let shortcuts = self
      .view_stack
      .last()
      .map(|v| v.shortcuts())
      .unwrap_or_default();
    draw_header(frame, header, &self.title, user.as_ref(), &shortcuts);

    if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, content);
    }
    self.command_input.render_overlay(frame, content);

    let breadcrumb = self.breadcrumb();
    let status = self.ctx.status.current();
    draw_footer(frame, footer, &breadcrumb, status.as_ref());
  }
}
