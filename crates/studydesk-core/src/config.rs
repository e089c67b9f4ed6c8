use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::timer::TimerSettings;
use crate::view::{
  SortKey,
  SortOrder,
  ViewConfig,
  ViewMode
};

const RC_ENV_VAR: &str = "STUDYDESKRC";
const RC_FILE_NAME: &str =
  ".studydeskrc";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Config {
  /// Built-in defaults only.
  pub fn defaults() -> Self {
    let mut cfg = Config {
      map:          HashMap::new(),
      loaded_files: vec![]
    };

    for (key, value) in [
      ("data.location", "~/.studydesk"),
      ("color", "on"),
      ("timer.pomodoro", "40"),
      ("timer.short_break", "5"),
      ("timer.long_break", "15"),
      ("timer.long_break_every", "4"),
      ("timer.mute", "off"),
      ("view.mode", "all"),
      ("view.sort", "manual"),
      ("view.order", "asc")
    ] {
      cfg.map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    cfg
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading rc file");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no rc file found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Parses `key` as `T`, falling back
  /// to `default` (with a warning) when
  /// the value is missing or invalid.
  pub fn get_parsed_or<T>(
    &self,
    key: &str,
    default: T
  ) -> T
  where
    T: FromStr
  {
    let Some(raw) = self.map.get(key)
    else {
      return default;
    };
    match raw.trim().parse::<T>() {
      | Ok(value) => value,
      | Err(_) => {
        warn!(
          key,
          value = %raw,
          "invalid config value; using default"
        );
        default
      }
    }
  }

  pub fn owner(&self) -> String {
    self
      .get("owner")
      .or_else(|| {
        std::env::var("USER").ok()
      })
      .map(|raw| raw.trim().to_string())
      .filter(|raw| !raw.is_empty())
      .unwrap_or_else(|| {
        "default".to_string()
      })
  }

  pub fn timer_settings(
    &self
  ) -> TimerSettings {
    let defaults =
      TimerSettings::default();
    let long_break_every = self
      .get_parsed_or(
        "timer.long_break_every",
        defaults.long_break_every
      );
    TimerSettings {
      pomodoro_minutes: self
        .get_parsed_or(
          "timer.pomodoro",
          defaults.pomodoro_minutes
        ),
      short_break_minutes: self
        .get_parsed_or(
          "timer.short_break",
          defaults.short_break_minutes
        ),
      long_break_minutes: self
        .get_parsed_or(
          "timer.long_break",
          defaults.long_break_minutes
        ),
      long_break_every: if long_break_every
        == 0
      {
        warn!(
          "timer.long_break_every must \
           be positive; using default"
        );
        defaults.long_break_every
      } else {
        long_break_every
      },
      muted: self
        .get_bool("timer.mute")
        .unwrap_or(defaults.muted)
    }
  }

  pub fn view_config(
    &self
  ) -> ViewConfig {
    ViewConfig {
      mode: self.get_parsed_or(
        "view.mode",
        ViewMode::default()
      ),
      filter_subject: self
        .get("view.subject"),
      search_term: String::new(),
      sort_by: self.get_parsed_or(
        "view.sort",
        SortKey::Manual
      ),
      sort_order: self.get_parsed_or(
        "view.order",
        SortOrder::default()
      )
    }
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if self
          .loaded_files
          .contains(&include_path)
        {
          warn!(include = %include_path.display(), "include cycle detected; skipping");
        } else if include_path.exists()
        {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".studydesk"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}
