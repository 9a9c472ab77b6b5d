mod junit;
mod paths;
mod settings_io;
