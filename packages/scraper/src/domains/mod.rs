pub mod gmaps;
