//! ZWO interval script parser.
//!
//! Walks the document as a stream of start/end events. Workout-level metadata
//! (`<name>`, `<description>`) is accumulated as text; each interval element
//! opens a pending interval which is appended when the element closes.
//! `IntervalsT` blocks expand into alternating on/off pairs on close.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::{debug, trace};

use crate::error::{Result, ScriptError};
use crate::import::WorkoutSource;
use crate::models::{Interval, IntervalType, PowerTarget, Workout};

/// Name used when the document has no usable `<name>`
pub const FALLBACK_WORKOUT_NAME: &str = "Workout";

/// Prefix for expanded `IntervalsT` entries
const REPEAT_GROUP_NAME: &str = "Intervals";

/// Largest `IntervalsT` repeat count that is expanded; bigger blocks are dropped
pub const MAX_REPEAT: u32 = 1000;

/// A ZWO document already read into memory
#[derive(Debug, Clone)]
pub struct ZwoSource {
    id: String,
    data: Vec<u8>,
}

impl ZwoSource {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}

impl WorkoutSource for ZwoSource {
    fn load_workout(&self) -> Result<Workout> {
        Ok(parse_zwo(&self.data, &self.id)?)
    }
}

/// Attribute list of one element, values unescaped
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn from_element(element: &BytesStart<'_>) -> std::result::Result<Self, ScriptError> {
        let mut values = Vec::new();
        for attribute in element.attributes() {
            let attribute = attribute.map_err(malformed)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(malformed)?.into_owned();
            values.push((key, value));
        }
        Ok(Self(values))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }

    /// Missing or unparsable durations become zero and are dropped later
    fn duration(&self, key: &str) -> f64 {
        self.number(key).unwrap_or(0.0)
    }

    fn power_target(&self, low: &str, high: &str, flat: &str) -> Option<PowerTarget> {
        let flat = self.number(flat);
        let low = self.number(low).or(flat);
        let high = self.number(high).or(flat);
        if low.is_none() && high.is_none() {
            return None;
        }
        Some(PowerTarget::new(low.or(high), high.or(low)))
    }
}

fn malformed(err: impl std::fmt::Display) -> ScriptError {
    ScriptError::Malformed {
        reason: err.to_string(),
    }
}

#[derive(Debug)]
enum PendingInterval {
    Single {
        element: String,
        name: &'static str,
        interval_type: IntervalType,
        duration: f64,
        power_target: Option<PowerTarget>,
        messages: Vec<String>,
    },
    Repeat {
        on_duration: f64,
        off_duration: f64,
        repeat: u32,
        on_power: Option<PowerTarget>,
        off_power: Option<PowerTarget>,
        messages: Vec<String>,
    },
}

impl PendingInterval {
    fn messages_mut(&mut self) -> &mut Vec<String> {
        match self {
            PendingInterval::Single { messages, .. } => messages,
            PendingInterval::Repeat { messages, .. } => messages,
        }
    }

    fn closes_on(&self, element: &str) -> bool {
        match self {
            PendingInterval::Single { element: open, .. } => open == element,
            PendingInterval::Repeat { .. } => element == "IntervalsT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Name,
    Description,
}

/// Parser state for one document
#[derive(Debug, Default)]
struct ZwoBuilder {
    name: Option<String>,
    fallback_name: Option<String>,
    description: Option<String>,
    capture: Option<TextTarget>,
    text: String,
    pending: Option<PendingInterval>,
    intervals: Vec<Interval>,
}

impl ZwoBuilder {
    fn start_element(&mut self, element: &str, attributes: &Attributes) {
        match element {
            "name" => self.begin_capture(TextTarget::Name),
            "description" => self.begin_capture(TextTarget::Description),
            "workout" => {
                if let Some(name) = attributes.get("name") {
                    self.fallback_name.get_or_insert_with(|| name.trim().to_string());
                }
            }
            "SteadyState" => self.begin_single(element, "Steady State", IntervalType::SteadyState, attributes),
            "Warmup" => self.begin_single(element, "Warm Up", IntervalType::Warmup, attributes),
            "Cooldown" => self.begin_single(element, "Cooldown", IntervalType::Cooldown, attributes),
            "FreeRide" => self.begin_single(element, "Free Ride", IntervalType::FreeRide, attributes),
            // Ramps carry one flat target range, not a time-varying one
            "Ramp" => self.begin_single(element, "Ramp", IntervalType::SteadyState, attributes),
            "IntervalsT" => {
                let repeat = attributes
                    .get("Repeat")
                    .and_then(|v| v.trim().parse::<u32>().ok())
                    .unwrap_or(0);
                let repeat = if repeat > MAX_REPEAT {
                    debug!(repeat, max = MAX_REPEAT, "Dropping oversized repeat block");
                    0
                } else {
                    repeat
                };
                self.pending = Some(PendingInterval::Repeat {
                    on_duration: attributes.duration("OnDuration"),
                    off_duration: attributes.duration("OffDuration"),
                    repeat,
                    on_power: attributes.power_target("PowerOnLow", "PowerOnHigh", "OnPower"),
                    off_power: attributes.power_target("PowerOffLow", "PowerOffHigh", "OffPower"),
                    messages: Vec::new(),
                });
            }
            _ if element.eq_ignore_ascii_case("textevent") => {
                if let (Some(message), Some(pending)) =
                    (attributes.get("message"), self.pending.as_mut())
                {
                    pending.messages_mut().push(message.to_string());
                }
            }
            _ => {}
        }
    }

    fn end_element(&mut self, element: &str) {
        match element {
            "name" | "description" => self.end_capture(),
            _ => {
                if self.pending.as_ref().is_some_and(|p| p.closes_on(element)) {
                    if let Some(pending) = self.pending.take() {
                        self.finish_pending(pending);
                    }
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        if self.capture.is_some() {
            self.text.push_str(text);
        }
    }

    fn begin_capture(&mut self, target: TextTarget) {
        self.capture = Some(target);
        self.text.clear();
    }

    fn end_capture(&mut self) {
        let Some(target) = self.capture.take() else {
            return;
        };
        let value = self.text.trim().to_string();
        self.text.clear();
        if value.is_empty() {
            return;
        }

        match target {
            TextTarget::Name => {
                self.name.get_or_insert(value);
            }
            TextTarget::Description => {
                self.description.get_or_insert(value);
            }
        }
    }

    fn begin_single(
        &mut self,
        element: &str,
        name: &'static str,
        interval_type: IntervalType,
        attributes: &Attributes,
    ) {
        self.pending = Some(PendingInterval::Single {
            element: element.to_string(),
            name,
            interval_type,
            duration: attributes.duration("Duration"),
            power_target: attributes.power_target("PowerLow", "PowerHigh", "Power"),
            messages: Vec::new(),
        });
    }

    fn finish_pending(&mut self, pending: PendingInterval) {
        match pending {
            PendingInterval::Single {
                name,
                interval_type,
                duration,
                power_target,
                messages,
                ..
            } => {
                let message = join_messages(&messages);
                self.push_interval(duration, name.to_string(), interval_type, message, power_target);
            }
            PendingInterval::Repeat {
                on_duration,
                off_duration,
                repeat,
                on_power,
                off_power,
                messages,
            } => {
                let message = join_messages(&messages);
                for i in 1..=repeat {
                    self.push_interval(
                        on_duration,
                        format!("{} On {}", REPEAT_GROUP_NAME, i),
                        IntervalType::IntervalOn,
                        message.clone(),
                        on_power,
                    );
                    self.push_interval(
                        off_duration,
                        format!("{} Off {}", REPEAT_GROUP_NAME, i),
                        IntervalType::IntervalOff,
                        message.clone(),
                        off_power,
                    );
                }
            }
        }
    }

    fn push_interval(
        &mut self,
        duration: f64,
        name: String,
        interval_type: IntervalType,
        message: Option<String>,
        power_target: Option<PowerTarget>,
    ) {
        if duration <= 0.0 {
            trace!(name = %name, "Dropping zero-duration interval");
            return;
        }

        self.intervals.push(
            Interval::new(duration, name, interval_type)
                .with_message(message)
                .with_power_target(power_target),
        );
    }

    fn build(self, id: &str) -> std::result::Result<Workout, ScriptError> {
        if self.intervals.is_empty() {
            return Err(ScriptError::NoIntervals);
        }

        let name = self
            .name
            .or(self.fallback_name.filter(|name| !name.is_empty()))
            .unwrap_or_else(|| FALLBACK_WORKOUT_NAME.to_string());

        let mut workout = Workout::new(id, name, self.intervals);
        workout.description = self.description;
        Ok(workout)
    }
}

fn join_messages(messages: &[String]) -> Option<String> {
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("\n"))
    }
}

fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

/// Parse a ZWO document into a workout with the given id.
///
/// Fails when the document is not well-formed or yields no intervals.
pub fn parse_zwo(data: &[u8], id: &str) -> std::result::Result<Workout, ScriptError> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);

    let mut builder = ZwoBuilder::default();
    let mut open_elements: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) => {
                let name = element_name(&e);
                let attributes = Attributes::from_element(&e)?;
                builder.start_element(&name, &attributes);
                open_elements.push(name);
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                let attributes = Attributes::from_element(&e)?;
                builder.start_element(&name, &attributes);
                builder.end_element(&name);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if open_elements.pop().as_deref() != Some(name.as_str()) {
                    return Err(malformed(format!("unexpected closing tag </{}>", name)));
                }
                builder.end_element(&name);
            }
            Event::Text(t) => {
                if open_elements.is_empty() {
                    return Err(malformed("text outside of the root element"));
                }
                let text: Cow<'_, str> = t.unescape().map_err(malformed)?;
                builder.text(&text);
            }
            Event::CData(t) => {
                builder.text(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(unclosed) = open_elements.last() {
        return Err(malformed(format!("unclosed element <{}>", unclosed)));
    }

    let workout = builder.build(id)?;
    debug!(
        id = %workout.id,
        name = %workout.name,
        intervals = workout.intervals.len(),
        total_secs = workout.total_duration(),
        "Parsed ZWO workout"
    );
    Ok(workout)
}
