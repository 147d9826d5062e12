pub const TOPIC_SENSOR_TEMP: &str = "sunblind/sensor/temperature";
pub const TOPIC_SENSOR_HUMIDITY: &str = "sunblind/sensor/humidity";
pub const TOPIC_SENSOR_LIGHT: &str = "sunblind/sensor/light";
pub const TOPIC_STATUS: &str = "sunblind/status";

pub const TOPIC_BLIND_ANGLE: &str = "sunblind/blind/angle";

pub const TOPIC_CMD_OFFSET: &str = "sunblind/cmnd/blind/offset";
pub const TOPIC_CMD_FACTOR: &str = "sunblind/cmnd/blind/factor";
