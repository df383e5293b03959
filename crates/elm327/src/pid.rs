//! OBD-II PID Registry
//!
//! One immutable table of the Mode-01 parameters this client decodes: wire
//! code, payload width, and the scaling formula from raw integer to physical
//! value.

use serde::{Deserialize, Serialize};

/// Mode-01 PIDs with typed accessors on the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Fuel tank level input (0x2F)
    FuelLevel = 0x2F,
    /// Absolute barometric pressure (0x33)
    BarometricPressure = 0x33,
}

impl Pid {
    /// Every PID in the registry, in wire-code order.
    pub const ALL: [Pid; 7] = [
        Pid::EngineLoad,
        Pid::CoolantTemp,
        Pid::Rpm,
        Pid::Speed,
        Pid::ThrottlePosition,
        Pid::FuelLevel,
        Pid::BarometricPressure,
    ];

    /// The PID number as it appears on the wire
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Number of payload bytes in the response
    pub fn data_bytes(self) -> usize {
        match self {
            Pid::Rpm => 2,
            _ => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Pid::EngineLoad => "Engine Load",
            Pid::CoolantTemp => "Coolant Temperature",
            Pid::Rpm => "Engine RPM",
            Pid::Speed => "Vehicle Speed",
            Pid::ThrottlePosition => "Throttle Position",
            Pid::FuelLevel => "Fuel Level",
            Pid::BarometricPressure => "Barometric Pressure",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Pid::EngineLoad | Pid::ThrottlePosition | Pid::FuelLevel => "%",
            Pid::CoolantTemp => "°C",
            Pid::Rpm => "rpm",
            Pid::Speed => "km/h",
            Pid::BarometricPressure => "kPa",
        }
    }

    /// Apply this PID's scaling formula to the raw integer payload.
    pub fn decode(self, raw: u64) -> f64 {
        match self {
            Pid::EngineLoad | Pid::ThrottlePosition | Pid::FuelLevel => raw as f64 / 2.55,
            Pid::CoolantTemp => raw as f64 - 40.0,
            Pid::Rpm => raw as f64 / 4.0,
            Pid::Speed | Pid::BarometricPressure => raw as f64,
        }
    }
}

/// A decoded sensor sample
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    /// The PID that was queried
    pub pid: Pid,
    pub name: &'static str,
    /// Physical value after scaling
    pub value: f64,
    pub unit: &'static str,
}
