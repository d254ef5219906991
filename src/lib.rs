pub mod evaluate;
pub mod experience;
pub mod misc;
pub mod movepick;
pub mod perceptron;
pub mod position;
pub mod search;
pub mod tb;
pub mod threads;
pub mod timeman;
pub mod tt;
pub mod types;
pub mod uci;
pub mod ucioption;
