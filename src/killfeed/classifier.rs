//! Kill feed line classification.
//!
//! Every template is anchored on the `[Killfeed] ` marker and the closing
//! period. Templates are tried in order and the first match wins, so the
//! more specific phrasings (`... by an Infected.`, `... with <weapon>.`)
//! come before the general ones they would otherwise be swallowed by.

use regex::{Captures, Regex};

use super::event::ClassifiedEvent;

const MARKER: &str = r"\[Killfeed\] ";
const END: &str = r"\.\s*$";

type Extract = fn(&Captures<'_>) -> ClassifiedEvent;

struct Template {
    name: &'static str,
    pattern: Regex,
    extract: Extract,
}

/// Ordered table of `(name, body, extractor)`.
const LADDER: &[(&str, &str, Extract)] = &[
    (
        "mauled",
        r"(?P<subject>.+?) got mauled to death by an? (?P<animal>.+?)",
        mauled,
    ),
    (
        "killed_by_infected",
        r"(?P<subject>.+?) got killed by an Infected",
        killed_by_infected,
    ),
    ("bled_out", r"(?P<subject>.+?) bled out", bled_out),
    (
        "beaten_with_weapon",
        r"(?P<subject>.+?) got beaten to a pulp by (?P<actor>.+?) with (?P<weapon>.+?)",
        beaten,
    ),
    (
        "beaten",
        r"(?P<subject>.+?) got beaten to a pulp by (?P<actor>.+?)",
        beaten,
    ),
    (
        "killed_with_weapon",
        r"(?P<subject>.+?) got killed by (?P<actor>.+?) with (?P<weapon>.+?)(?: from a distance of (?P<distance>\d+(?:\.\d+)?)\s?[mM])?",
        killed_with_weapon,
    ),
    (
        "killed_by",
        r"(?P<subject>.+?) got killed by (?P<actor>.+?)",
        killed_by,
    ),
    ("killed", r"(?P<subject>.+?) got killed", killed),
    ("fell", r"(?P<subject>.+?) fell to their death", fell),
    (
        "poisoned",
        r"(?P<subject>.+?) died from Chemical Poisoning",
        poisoned,
    ),
];

fn mauled(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::Mauled {
        subject: field(c, "subject"),
        animal: raw(c, "animal").unwrap_or_default(),
    }
}

fn killed_by_infected(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::KilledByInfected {
        subject: field(c, "subject"),
    }
}

fn bled_out(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::BledOut {
        subject: field(c, "subject"),
    }
}

fn beaten(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::Beaten {
        subject: field(c, "subject"),
        actor: field(c, "actor"),
        weapon: raw(c, "weapon"),
    }
}

fn killed_with_weapon(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::KilledWithWeapon {
        subject: field(c, "subject"),
        actor: field(c, "actor"),
        weapon: raw(c, "weapon").unwrap_or_default(),
        distance_m: c.name("distance").and_then(|m| m.as_str().parse().ok()),
    }
}

fn killed_by(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::KilledBy {
        subject: field(c, "subject"),
        actor: field(c, "actor"),
    }
}

fn killed(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::Killed {
        subject: field(c, "subject"),
    }
}

fn fell(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::Fell {
        subject: field(c, "subject"),
    }
}

fn poisoned(c: &Captures<'_>) -> ClassifiedEvent {
    ClassifiedEvent::Poisoned {
        subject: field(c, "subject"),
    }
}

fn raw(caps: &Captures<'_>, group: &str) -> Option<String> {
    caps.name(group).map(|m| m.as_str().trim().to_string())
}

fn field(caps: &Captures<'_>, group: &str) -> String {
    caps.name(group)
        .map(|m| normalize_name(m.as_str()))
        .unwrap_or_default()
}

/// Strip leading bracketed tags (`[Survivor] [Team] Bob`) and surrounding
/// whitespace from a captured name.
pub fn normalize_name(raw: &str) -> String {
    let mut name = raw.trim();
    while let Some(rest) = name.strip_prefix('[') {
        let Some(end) = rest.find(']') else {
            break;
        };
        name = rest[end + 1..].trim_start();
    }
    name.trim().to_string()
}

/// Maps raw log lines to [`ClassifiedEvent`]s.
pub struct EventClassifier {
    templates: Vec<Template>,
}

impl EventClassifier {
    pub fn new() -> Self {
        let templates = LADDER
            .iter()
            .map(|&(name, body, extract)| Template {
                name,
                pattern: Regex::new(&format!("{MARKER}{body}{END}"))
                    .expect("kill feed templates are valid regexes"),
                extract,
            })
            .collect();
        Self { templates }
    }

    /// Template names in the order they are tried.
    pub fn template_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.templates.iter().map(|t| t.name)
    }

    /// Classify a line, returning the event of the first matching template.
    pub fn classify(&self, line: &str) -> Option<ClassifiedEvent> {
        self.classify_named(line).map(|(_, event)| event)
    }

    /// Like [`classify`](Self::classify), also returning the template name.
    pub fn classify_named(&self, line: &str) -> Option<(&'static str, ClassifiedEvent)> {
        if !line.contains("[Killfeed]") {
            return None;
        }
        self.templates.iter().find_map(|template| {
            let caps = template.pattern.captures(line)?;
            let event = (template.extract)(&caps);
            if event.subject().is_empty() {
                return None;
            }
            Some((template.name, event))
        })
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventClassifier")
            .field("templates", &self.templates.len())
            .finish()
    }
}
