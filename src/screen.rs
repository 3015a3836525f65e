//! Screen navigation: which view a session is on and how it may move.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_WORD_CHARS: usize = 64;
const MAX_EXPLORED_WORDS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    #[default]
    Login,
    Main,
    Morphology,
    Challenges,
    Profile,
    Tree,
}

impl Screen {
    /// Screens offered by the navigation bar, in display order.
    pub const NAVIGABLE: [Screen; 5] = [
        Screen::Main,
        Screen::Morphology,
        Screen::Tree,
        Screen::Challenges,
        Screen::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::Login => "login",
            Screen::Main => "main",
            Screen::Morphology => "morphology",
            Screen::Challenges => "challenges",
            Screen::Profile => "profile",
            Screen::Tree => "tree",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Screen::Login => "Entrar",
            Screen::Main => "Início",
            Screen::Morphology => "Morfologia",
            Screen::Challenges => "Desafios",
            Screen::Profile => "Perfil",
            Screen::Tree => "Árvore",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Screen {
    type Err = NavigationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "login" => Ok(Screen::Login),
            "main" => Ok(Screen::Main),
            "morphology" => Ok(Screen::Morphology),
            "challenges" => Ok(Screen::Challenges),
            "profile" => Ok(Screen::Profile),
            "tree" => Ok(Screen::Tree),
            other => Err(NavigationError::UnknownScreen(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Login,
    SelectWord(String),
    StartChallenge,
    Navigate(Screen),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("log in before navigating")]
    NotLoggedIn,
    #[error("cannot {action} from the {from} screen")]
    InvalidTransition { from: Screen, action: &'static str },
    #[error("select a non-empty word")]
    EmptyWord,
    #[error("words are limited to 64 characters")]
    WordTooLong,
    #[error("unknown screen {0:?}")]
    UnknownScreen(String),
}

/// Per-session navigation state. Starts on the login screen, logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenRouter {
    current: Screen,
    selected_word: String,
    logged_in: bool,
    explored: Vec<String>,
}

impl ScreenRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Screen {
        self.current
    }

    pub fn selected_word(&self) -> Option<&str> {
        Some(self.selected_word.as_str()).filter(|word| !word.is_empty())
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn shows_navigation(&self) -> bool {
        self.logged_in && self.current != Screen::Login
    }

    /// Distinct words selected during this session, oldest first.
    pub fn explored_words(&self) -> &[String] {
        &self.explored
    }

    pub fn apply(&mut self, transition: Transition) -> Result<Screen, NavigationError> {
        match transition {
            Transition::Login => self.login(),
            Transition::SelectWord(word) => self.select_word(&word),
            Transition::StartChallenge => self.start_challenge(),
            Transition::Navigate(target) => self.navigate(target),
        }
    }

    pub fn login(&mut self) -> Result<Screen, NavigationError> {
        if self.current != Screen::Login {
            return Err(self.invalid("log in"));
        }
        self.logged_in = true;
        Ok(self.enter(Screen::Main))
    }

    pub fn select_word(&mut self, word: &str) -> Result<Screen, NavigationError> {
        if self.current != Screen::Main {
            return Err(self.invalid("select a word"));
        }
        let word = word.trim();
        if word.is_empty() {
            return Err(NavigationError::EmptyWord);
        }
        if word.chars().count() > MAX_WORD_CHARS {
            return Err(NavigationError::WordTooLong);
        }
        self.selected_word = word.to_string();
        if !self.explored.iter().any(|seen| seen.eq_ignore_ascii_case(word)) {
            if self.explored.len() >= MAX_EXPLORED_WORDS {
                self.explored.remove(0);
            }
            self.explored.push(word.to_string());
        }
        Ok(self.enter(Screen::Morphology))
    }

    pub fn start_challenge(&mut self) -> Result<Screen, NavigationError> {
        if self.current != Screen::Morphology {
            return Err(self.invalid("start a challenge"));
        }
        Ok(self.enter(Screen::Challenges))
    }

    pub fn navigate(&mut self, target: Screen) -> Result<Screen, NavigationError> {
        if !self.logged_in {
            return Err(NavigationError::NotLoggedIn);
        }
        if target == Screen::Login {
            return Err(self.invalid("navigate to login"));
        }
        Ok(self.enter(target))
    }

    fn enter(&mut self, screen: Screen) -> Screen {
        self.current = screen;
        screen
    }

    fn invalid(&self, action: &'static str) -> NavigationError {
        NavigationError::InvalidTransition {
            from: self.current,
            action,
        }
    }
}
