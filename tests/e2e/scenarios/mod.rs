mod concurrency;
mod gc;
mod verify;
