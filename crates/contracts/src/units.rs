//! Measurement unit table
//!
//! Sensors carry a numeric unit code; the table resolves it to a display name
//! and symbol for the local observer log.

/// A measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub id: u16,
    pub name: &'static str,
    pub symbol: &'static str,
}

const fn unit(id: u16, name: &'static str, symbol: &'static str) -> Unit {
    Unit { id, name, symbol }
}

/// All known units, indexed by id
pub static UNITS: [Unit; 42] = [
    unit(0, "Temperature", "°C"),
    unit(1, "Humidity", "%"),
    unit(2, "Pressure", "hPa"),
    unit(3, "Air Quality", "AQI"),
    unit(4, "Light", "lux"),
    unit(5, "Status", ""),
    unit(6, "Gas", "ppm"),
    unit(7, "Water", "L"),
    unit(8, "Motion", ""),
    unit(9, "Energy", "kWh"),
    unit(10, "Current", "A"),
    unit(11, "Power", "W"),
    unit(12, "Rotation Speed", "rpm"),
    unit(13, "Vibration", "g"),
    unit(14, "Brightness", "lx"),
    // Environmental
    unit(15, "Air Quality PM2.5", "µg/m³"),
    unit(16, "Air Quality PM10", "µg/m³"),
    unit(17, "CO2", "ppm"),
    unit(18, "VOC", "ppb"),
    unit(19, "Noise Level", "dB"),
    unit(20, "UV Index", "UVI"),
    unit(21, "Barometric Pressure", "hPa"),
    // Security
    unit(22, "Contact", "bool"),
    unit(23, "Glass Break", "bool"),
    unit(24, "Smoke", "ppm"),
    unit(25, "Carbon Monoxide", "ppm"),
    unit(26, "Water Leak", "bool"),
    // Energy management
    unit(27, "Energy Consumption", "kWh"),
    unit(28, "Gas Consumption", "m³"),
    unit(29, "Water Consumption", "m³"),
    unit(30, "Solar Output", "kW"),
    unit(31, "Battery Level", "%"),
    // Comfort
    unit(32, "Occupancy", "n"),
    unit(33, "Air Quality Index", "AQI"),
    unit(34, "Thermal Comfort", "TCI"),
    unit(35, "Rain", "mm/h"),
    unit(36, "Wind Speed", "km/h"),
    unit(37, "Wind Direction", "°"),
    unit(38, "Percentage", "%"),
    unit(39, "Binary", "bool"),
    unit(40, "Kelvin", "K"),
    unit(41, "PPM", "ppm"),
];

/// Look up a unit symbol, empty for unknown codes
pub fn unit_symbol(code: u16) -> &'static str {
    UNITS
        .get(code as usize)
        .map(|u| u.symbol)
        .unwrap_or("")
}
