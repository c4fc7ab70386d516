//! Table layout. Column names follow the wavelength labels (`R`, `G`, `IR`).

pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS readings (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    unit      TEXT    NOT NULL,
    channel   INTEGER NOT NULL,
    R         INTEGER,
    G         INTEGER,
    IR        INTEGER
);
CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON readings(timestamp);
CREATE INDEX IF NOT EXISTS idx_readings_unit_channel ON readings(unit, channel, timestamp);

CREATE TABLE IF NOT EXISTS statistics (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    unit      TEXT    NOT NULL,
    channel   INTEGER NOT NULL,
    R_mean    REAL,
    R_std     REAL,
    G_mean    REAL,
    G_std     REAL,
    IR_mean   REAL,
    IR_std    REAL
);
CREATE INDEX IF NOT EXISTS idx_statistics_unit_channel ON statistics(unit, channel, timestamp);

CREATE TABLE IF NOT EXISTS alerts (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    unit      TEXT    NOT NULL,
    channel   INTEGER NOT NULL,
    severity  TEXT    NOT NULL,
    message   TEXT    NOT NULL,
    R_value   INTEGER,
    G_value   INTEGER,
    IR_value  INTEGER,
    R_zscore  REAL,
    G_zscore  REAL,
    IR_zscore REAL
);
CREATE INDEX IF NOT EXISTS idx_alerts_unit_channel ON alerts(unit, channel, timestamp);

CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";
