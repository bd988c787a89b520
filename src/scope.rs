//! ## Scope
//!
//! Vendor independent control of an oscilloscope's acquisition state.
//!
//! An instrument is identified with `*IDN?` and matched against an ordered
//! table of profiles. A profile is data: the commands that put the scope in
//! each state and the query (with its parser) that reads the state back.
//!

use std::fmt;

use crate::error::ScopeError;
use crate::session::Session;
use crate::tokenizer::{self, tokenize};
use crate::transport::UsbTransport;

const IDN_QUERY: &str = "*IDN?";
const IDN_FIELDS: usize = 4;
const IDN_RESPONSE_LEN: usize = 255;
const STATE_RESPONSE_LEN: usize = 64;

/// ### Scope State
///
/// Acquisition state of an oscilloscope.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeState {
    Stopped,
    Running,
    Single,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Single => write!(f, "single"),
        }
    }
}

/// Commands putting the scope into each state
#[derive(Debug)]
pub struct StateCommands {
    pub stop: &'static str,
    pub run: &'static str,
    pub single: &'static str,
}

impl StateCommands {
    pub fn command(&self, state: ScopeState) -> &'static str {
        match state {
            ScopeState::Stopped => self.stop,
            ScopeState::Running => self.run,
            ScopeState::Single => self.single,
        }
    }
}

/// Query reading the state back and how to interpret its reply
#[derive(Debug)]
pub struct StateQuery {
    pub query: &'static str,
    pub parse: fn(&str) -> Result<ScopeState, ScopeError>,
}

/// ### Instrument Profile
///
/// How to drive one family of instruments.
///
#[derive(Debug)]
pub struct InstrumentProfile {
    pub name: &'static str,
    pub commands: &'static StateCommands,
    pub status: &'static StateQuery,
}

/// A row of the detection table. `None` matches anything.
#[derive(Debug)]
pub struct ProfileMatch {
    pub vendor: Option<&'static str>,
    pub model: Option<&'static str>,
    pub profile: &'static InstrumentProfile,
}

impl ProfileMatch {
    fn matches(&self, vendor: &str, model: &str) -> bool {
        self.vendor.map_or(true, |v| v.eq_ignore_ascii_case(vendor))
            && self.model.map_or(true, |m| m.eq_ignore_ascii_case(model))
    }
}

fn expect_tokens(response: &str, expected: usize) -> Result<Vec<&str>, ScopeError> {
    let tokens = tokenize(response, expected);
    if tokens.len() != expected {
        return Err(ScopeError::TokenCount {
            expected,
            found: tokens.len(),
        });
    }
    Ok(tokens)
}

/// `<stop after>;<state>` as answered by `ACQuire:STOPAfter?;STATE?`.
/// The stop-after mode picks single or running, a state of 0 means stopped.
pub fn parse_acquire_state(response: &str) -> Result<ScopeState, ScopeError> {
    let tokens = expect_tokens(response, 2)?;
    let (stop_after, state) = (tokens[0], tokens[1]);

    let mode = if stop_after.eq_ignore_ascii_case("RUNSTOP") {
        ScopeState::Running
    } else if stop_after.eq_ignore_ascii_case("SEQUENCE") {
        ScopeState::Single
    } else {
        return Err(ScopeError::UnrecognizedToken(stop_after.to_string()));
    };

    match state {
        "0" => Ok(ScopeState::Stopped),
        "1" => Ok(mode),
        other => Err(ScopeError::UnrecognizedToken(other.to_string())),
    }
}

/// Single mnemonic as answered by `RSTate?`.
pub fn parse_run_state(response: &str) -> Result<ScopeState, ScopeError> {
    let tokens = expect_tokens(response, 1)?;
    let mnemonic = tokens[0];

    [
        ("RUN", ScopeState::Running),
        ("SING", ScopeState::Single),
        ("STOP", ScopeState::Stopped),
    ]
    .into_iter()
    .find(|(name, _)| name.eq_ignore_ascii_case(mnemonic))
    .map(|(_, state)| state)
    .ok_or_else(|| ScopeError::UnrecognizedToken(mnemonic.to_string()))
}

static TEKTRONIX_COMMANDS: StateCommands = StateCommands {
    stop: "ACQuire:STATE STOP",
    run: "ACQuire:STOPAfter RUNSTOP; STATE RUN",
    single: "ACQuire:STOPAfter SEQUENCE; STATE RUN",
};

static KEYSIGHT_COMMANDS: StateCommands = StateCommands {
    stop: "STOP",
    run: "RUN",
    single: "SINGle",
};

static ACQUIRE_QUERY: StateQuery = StateQuery {
    query: "ACQuire:STOPAfter?;STATE?",
    parse: parse_acquire_state,
};

static RSTATE_QUERY: StateQuery = StateQuery {
    query: "RSTate?",
    parse: parse_run_state,
};

pub static TEKTRONIX: InstrumentProfile = InstrumentProfile {
    name: "Tektronix",
    commands: &TEKTRONIX_COMMANDS,
    status: &ACQUIRE_QUERY,
};

pub static KEYSIGHT: InstrumentProfile = InstrumentProfile {
    name: "Keysight",
    commands: &KEYSIGHT_COMMANDS,
    status: &RSTATE_QUERY,
};

/// The TMC emulator takes Tektronix commands but reports state like a Keysight
pub static TMCEMU: InstrumentProfile = InstrumentProfile {
    name: "TMCEMU",
    commands: &TEKTRONIX_COMMANDS,
    status: &RSTATE_QUERY,
};

/// Detection table, first match wins
pub static PROFILES: &[ProfileMatch] = &[
    ProfileMatch {
        vendor: Some("Tektronix"),
        model: None,
        profile: &TEKTRONIX,
    },
    ProfileMatch {
        vendor: Some("KEYSIGHT TECHNOLOGIES"),
        model: None,
        profile: &KEYSIGHT,
    },
    ProfileMatch {
        vendor: Some("AGILENT TECHNOLOGIES"),
        model: None,
        profile: &KEYSIGHT,
    },
    ProfileMatch {
        vendor: None,
        model: Some("TMCEMU"),
        profile: &TMCEMU,
    },
];

/// ### Identity
///
/// The four fields of an `*IDN?` reply.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub vendor: String,
    pub model: String,
    pub serial: String,
    pub revision: String,
}

impl Identity {
    /// Parse an `*IDN?` reply, which must have exactly four fields.
    pub fn parse(response: &str) -> Result<Identity, ScopeError> {
        let tokens = expect_tokens(response, IDN_FIELDS)?;
        Ok(Identity {
            vendor: tokens[0].to_string(),
            model: tokens[1].to_string(),
            serial: tokens[2].to_string(),
            revision: tokens[3].to_string(),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.vendor, self.model, self.serial, self.revision
        )
    }
}

/// Find the first profile of `table` matching `vendor` and `model`, ignoring case.
pub fn match_profile(
    table: &'static [ProfileMatch],
    vendor: &str,
    model: &str,
) -> Option<&'static InstrumentProfile> {
    table
        .iter()
        .find(|row| row.matches(vendor, model))
        .map(|row| row.profile)
}

fn ask_text<T: UsbTransport>(
    session: &Session<T>,
    query: &str,
    answer: &mut [u8],
) -> Result<String, ScopeError> {
    tracing::debug!(query, "querying instrument");
    let len = session.try_ask(query.as_bytes(), answer, session.config().default_timeout)?;
    let text = std::str::from_utf8(&answer[..len]).map_err(|_| ScopeError::NotText)?;
    // drop the terminator so it does not open an empty trailing field
    Ok(tokenizer::trim(text, tokenizer::STRIP_CHARS).to_string())
}

/// ### Identify
///
/// Send `*IDN?` and parse the reply.
///
pub fn identify<T: UsbTransport>(session: &Session<T>) -> Result<Identity, ScopeError> {
    let mut answer = [0u8; IDN_RESPONSE_LEN];
    let response = ask_text(session, IDN_QUERY, &mut answer)?;
    tracing::info!(idn = %response, "*IDN? reply");
    Identity::parse(&response)
}

/// ### Detect
///
/// Identify the instrument and pick its profile. `None` if the
/// identification fails or no profile matches.
///
pub fn detect<T: UsbTransport>(session: &Session<T>) -> Option<&'static InstrumentProfile> {
    let identity = match identify(session) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::warn!(%err, "instrument identification failed");
            return None;
        }
    };

    let profile = match_profile(PROFILES, &identity.vendor, &identity.model);
    match profile {
        Some(profile) => tracing::info!(profile = profile.name, "instrument detected"),
        None => tracing::warn!(
            vendor = %identity.vendor,
            model = %identity.model,
            "no profile for instrument"
        ),
    }
    profile
}

impl InstrumentProfile {
    /// ### Set State
    ///
    /// Send the command for `state`. Succeeds once the whole command was written.
    ///
    pub fn set_state<T: UsbTransport>(
        &self,
        session: &Session<T>,
        state: ScopeState,
    ) -> Result<(), ScopeError> {
        let command = self.commands.command(state);
        tracing::debug!(command, %state, "running scope command");

        let written = session.try_write(command.as_bytes(), session.config().default_timeout)?;
        if written != command.len() {
            return Err(ScopeError::ShortWrite {
                written,
                expected: command.len(),
            });
        }
        Ok(())
    }

    /// ### Get State
    ///
    /// Query the acquisition state and interpret the reply.
    ///
    pub fn get_state<T: UsbTransport>(
        &self,
        session: &Session<T>,
    ) -> Result<ScopeState, ScopeError> {
        let mut answer = [0u8; STATE_RESPONSE_LEN];
        let response = ask_text(session, self.status.query, &mut answer)?;
        (self.status.parse)(&response)
    }
}

/// Put the scope into `state` using `profile`'s commands.
pub fn set_state<T: UsbTransport>(
    session: &Session<T>,
    profile: &InstrumentProfile,
    state: ScopeState,
) -> Result<(), ScopeError> {
    profile.set_state(session, state).inspect_err(|err| {
        tracing::warn!(%err, profile = profile.name, "scope command failed");
    })
}

/// Read the scope's state using `profile`'s query.
pub fn get_state<T: UsbTransport>(
    session: &Session<T>,
    profile: &InstrumentProfile,
) -> Result<ScopeState, ScopeError> {
    profile.get_state(session).inspect_err(|err| {
        tracing::warn!(%err, profile = profile.name, "state query failed");
    })
}
